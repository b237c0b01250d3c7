//! Render representation built from a compiled physics model
//!
//! The simulation scene is constructed from the engine's geometry arrays,
//! not from the unified model: the engine has already applied compiler
//! defaults, fromto placement, and mesh transforms, so its arrays are the
//! authority on what actually simulates. The unified model only
//! contributes materials, matched by body name.

use std::sync::Arc;

use glam::{DQuat, DVec3};
use rovi_formats::mjcf::COLLISION_GROUP;
use rovi_model::{InertiaTensor, MeshData, RenderHandle, UnifiedRobotModel};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::convert;
use crate::kernel::{GeomKind, JointKind, ModelView};

/// UI visibility toggles, handed in explicitly rather than read from
/// ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibilityFlags {
    pub visual: bool,
    pub collision: bool,
    pub body_axes: bool,
    pub center_of_mass: bool,
    pub inertia_boxes: bool,
    pub joint_arrows: bool,
}

impl Default for VisibilityFlags {
    fn default() -> Self {
        Self {
            visual: true,
            collision: false,
            body_axes: false,
            center_of_mass: false,
            inertia_boxes: false,
            joint_arrows: false,
        }
    }
}

/// Analytic or mesh shape a scene geom renders as.
#[derive(Debug, Clone)]
pub enum RenderShape {
    /// Full extents; engine-infinite planes get a large finite quad.
    Plane { size: [f32; 2] },
    Sphere { radius: f32 },
    Capsule { radius: f32, length: f32 },
    Ellipsoid { radii: [f32; 3] },
    Cylinder { radius: f32, length: f32 },
    Box { half_extents: [f32; 3] },
    Mesh(Arc<MeshData>),
}

/// One engine geom mirrored into the render scene.
#[derive(Debug, Clone)]
pub struct GeomNode {
    pub id: Uuid,
    pub geom_index: usize,
    pub body_index: usize,
    pub shape: RenderShape,
    /// Offset within the body frame, render coordinates.
    pub local_position: DVec3,
    pub local_rotation: DQuat,
    pub color: [f32; 4],
    pub collision: bool,
    pub wireframe: bool,
    pub visible: bool,
}

/// Auxiliary visualization attached to a body.
#[derive(Debug, Clone)]
pub enum MarkerKind {
    /// Local frame axes at the body origin.
    AxisTriad,
    /// Marker at the body's center of mass, render coordinates.
    CenterOfMass { position: DVec3 },
    /// Box with the same mass and principal moments as the body.
    InertiaBox {
        half_extents: [f32; 3],
        position: DVec3,
        rotation: DQuat,
    },
    /// Rotation axis for hinge and ball joints.
    JointArrow { axis: DVec3, position: DVec3 },
}

#[derive(Debug, Clone)]
pub struct MarkerNode {
    pub id: Uuid,
    pub kind: MarkerKind,
    pub visible: bool,
}

/// One engine body: world pose plus its geoms and markers.
#[derive(Debug, Clone)]
pub struct BodyNode {
    pub id: Uuid,
    pub body_index: usize,
    pub name: String,
    /// World pose, render frame, refreshed every synchronization.
    pub position: DVec3,
    pub rotation: DQuat,
    pub geoms: Vec<GeomNode>,
    pub markers: Vec<MarkerNode>,
}

/// The whole simulation-side render tree.
#[derive(Debug, Clone, Default)]
pub struct SimScene {
    pub bodies: Vec<BodyNode>,
    pub flags: VisibilityFlags,
    /// Handle the embedding attached for this scene, when it has.
    pub render: Option<RenderHandle>,
}

impl SimScene {
    pub fn geom_count(&self) -> usize {
        self.bodies.iter().map(|b| b.geoms.len()).sum()
    }

    pub fn body(&self, index: usize) -> Option<&BodyNode> {
        self.bodies.iter().find(|b| b.body_index == index)
    }

    pub fn body_by_name(&self, name: &str) -> Option<&BodyNode> {
        self.bodies.iter().find(|b| b.name == name)
    }

    /// Re-apply a toggle record to every geom and marker.
    pub fn apply_flags(&mut self, flags: VisibilityFlags) {
        self.flags = flags;
        for body in &mut self.bodies {
            for geom in &mut body.geoms {
                geom.visible = if geom.collision {
                    flags.collision
                } else {
                    flags.visual
                };
            }
            for marker in &mut body.markers {
                marker.visible = match marker.kind {
                    MarkerKind::AxisTriad => flags.body_axes,
                    MarkerKind::CenterOfMass { .. } => flags.center_of_mass,
                    MarkerKind::InertiaBox { .. } => flags.inertia_boxes,
                    MarkerKind::JointArrow { .. } => flags.joint_arrows,
                };
            }
        }
    }
}

/// Build the scene from a compiled model's arrays.
///
/// Geom placement converts into the render frame here, once; body poses
/// start at identity and are filled by the first synchronization.
pub fn build_scene<M: ModelView>(
    model: &M,
    source: &UnifiedRobotModel,
    flags: VisibilityFlags,
) -> SimScene {
    let mut bodies: Vec<BodyNode> = (0..model.nbody())
        .map(|b| BodyNode {
            id: Uuid::new_v4(),
            body_index: b,
            name: model
                .body_name(b)
                .unwrap_or_else(|| format!("body_{b}")),
            position: DVec3::ZERO,
            rotation: DQuat::IDENTITY,
            geoms: Vec::new(),
            markers: Vec::new(),
        })
        .collect();

    for g in 0..model.ngeom() {
        let body = model.geom_bodyid(g);
        if body >= bodies.len() {
            warn!(geom = g, body, "geom references a body out of range");
            continue;
        }
        let Some(shape) = render_shape(model, g) else {
            warn!(geom = g, "geometry kind has no render equivalent, skipping");
            continue;
        };
        let collision = model.geom_group(g) >= COLLISION_GROUP;
        let color = preferred_color(source, &bodies[body].name)
            .unwrap_or_else(|| model.geom_rgba(g));
        bodies[body].geoms.push(GeomNode {
            id: Uuid::new_v4(),
            geom_index: g,
            body_index: body,
            shape,
            local_position: convert::pos_to_render(model.geom_pos(g)),
            local_rotation: convert::quat_to_render(model.geom_quat(g)),
            color,
            collision,
            wireframe: collision,
            visible: if collision { flags.collision } else { flags.visual },
        });
    }

    // Body 0 is the world; it gets geoms but no markers.
    for (b, body) in bodies.iter_mut().enumerate().skip(1) {
        body.markers.push(MarkerNode {
            id: Uuid::new_v4(),
            kind: MarkerKind::AxisTriad,
            visible: flags.body_axes,
        });
        let mass = model.body_mass(b);
        if mass > 0.0 {
            let com = convert::pos_to_render(model.body_ipos(b));
            body.markers.push(MarkerNode {
                id: Uuid::new_v4(),
                kind: MarkerKind::CenterOfMass { position: com },
                visible: flags.center_of_mass,
            });
            let moments = model.body_inertia(b);
            let tensor = InertiaTensor::from_diagonal(
                moments[0] as f32,
                moments[1] as f32,
                moments[2] as f32,
            );
            body.markers.push(MarkerNode {
                id: Uuid::new_v4(),
                kind: MarkerKind::InertiaBox {
                    half_extents: tensor.equivalent_box_half_extents(mass as f32),
                    position: com,
                    rotation: convert::quat_to_render(model.body_iquat(b)),
                },
                visible: flags.inertia_boxes,
            });
        }
    }

    for j in 0..model.njnt() {
        if !matches!(model.jnt_kind(j), JointKind::Hinge | JointKind::Ball) {
            continue;
        }
        let body = model.jnt_bodyid(j);
        if body == 0 || body >= bodies.len() {
            continue;
        }
        bodies[body].markers.push(MarkerNode {
            id: Uuid::new_v4(),
            kind: MarkerKind::JointArrow {
                axis: convert::pos_to_render(model.jnt_axis(j)),
                position: convert::pos_to_render(model.jnt_pos(j)),
            },
            visible: flags.joint_arrows,
        });
    }

    SimScene {
        bodies,
        flags,
        render: None,
    }
}

/// Material resolved through the unified model's link of the same name,
/// taking priority over the engine's flat rgba.
fn preferred_color(source: &UnifiedRobotModel, body_name: &str) -> Option<[f32; 4]> {
    let link = source.link(body_name)?;
    link.visuals.first().map(|v| v.color)
}

fn render_shape<M: ModelView>(model: &M, geom: usize) -> Option<RenderShape> {
    let size = model.geom_size(geom);
    let shape = match model.geom_kind(geom) {
        GeomKind::Plane => RenderShape::Plane {
            size: plane_extent(size),
        },
        GeomKind::Sphere => RenderShape::Sphere {
            radius: size[0] as f32,
        },
        GeomKind::Capsule => RenderShape::Capsule {
            radius: size[0] as f32,
            length: 2.0 * size[1] as f32,
        },
        GeomKind::Ellipsoid => RenderShape::Ellipsoid {
            radii: [size[0] as f32, size[1] as f32, size[2] as f32],
        },
        GeomKind::Cylinder => RenderShape::Cylinder {
            radius: size[0] as f32,
            length: 2.0 * size[1] as f32,
        },
        GeomKind::Box => RenderShape::Box {
            half_extents: [size[0] as f32, size[1] as f32, size[2] as f32],
        },
        GeomKind::Mesh => {
            let data = model.geom_dataid(geom)?;
            RenderShape::Mesh(Arc::new(engine_mesh(model, data)))
        }
        GeomKind::HeightField => return None,
    };
    Some(shape)
}

/// Engine size semantics: half extents, zero meaning infinite.
fn plane_extent(size: [f64; 3]) -> [f32; 2] {
    let side = |v: f64| if v > 0.0 { (2.0 * v) as f32 } else { 50.0 };
    [side(size[0]), side(size[1])]
}

/// Rebuild a mesh from the engine's raw buffers with the axis permutation
/// baked in. The buffers are shared across every instance of the mesh, so
/// this happens exactly once.
fn engine_mesh<M: ModelView>(model: &M, mesh: usize) -> MeshData {
    let mut data = MeshData::named(format!("engine_mesh_{mesh}"));
    data.vertices = model.mesh_vertices(mesh);
    data.normals = model.mesh_normals(mesh);
    data.indices = model.mesh_faces(mesh);
    convert::permute_mesh_buffer(&mut data.vertices);
    convert::permute_mesh_buffer(&mut data.normals);
    data
}
