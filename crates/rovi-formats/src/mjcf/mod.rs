//! MJCF import: MuJoCo physics documents into the unified model

mod parser;
mod types;

pub use parser::parse_mjcf;
pub use types::{
    DEFAULT_TIMESTEP, MjcfBody, MjcfCompiler, MjcfDocument, MjcfEquality, MjcfEqualityKind,
    MjcfGeom, MjcfGeomKind, MjcfInertial, MjcfJoint, MjcfJointKind, MjcfMaterial, MjcfMeshAsset,
};

use std::sync::Arc;

use glam::{Quat, Vec3};
use rovi_assets::{FileBundle, MeshDecoderRegistry, ResolvedAsset, resolver};
use rovi_model::{
    CollisionGeometry, Constraint, GeometryType, InertiaTensor, InertialProperties, Joint,
    JointBuilder, JointLimits, JointType, Link, Material, MeshData, Origin, UnifiedRobotModel,
    VisualGeometry,
};
use tracing::{info, warn};

use crate::error::{AdapterError, AdapterResult};

/// Geoms in this group or above are collision proxies, everything below
/// renders as visual geometry.
pub const COLLISION_GROUP: i32 = 3;

/// Options for MJCF conversion.
#[derive(Debug, Clone)]
pub struct MjcfOptions {
    /// Bundle directory of the source document, for relative references.
    pub context_dir: String,
    /// Color applied when neither the geom nor its material gives one.
    pub default_color: [f32; 4],
}

impl Default for MjcfOptions {
    fn default() -> Self {
        Self {
            context_dir: String::new(),
            default_color: Material::DEFAULT_COLOR,
        }
    }
}

/// Parse MJCF text and convert it into a unified model.
pub fn load_mjcf(
    text: &str,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &MjcfOptions,
) -> AdapterResult<UnifiedRobotModel> {
    let document = parse_mjcf(text, bundle)?;
    convert_document(&document, bundle, registry, options)
}

/// Convert an already-parsed MJCF document.
pub fn convert_document(
    document: &MjcfDocument,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &MjcfOptions,
) -> AdapterResult<UnifiedRobotModel> {
    let mut model = UnifiedRobotModel::new(&document.model_name);

    for material in &document.materials {
        if material.name.is_empty() {
            continue;
        }
        let mut converted = Material::from_rgba(
            &material.name,
            material.rgba.unwrap_or(options.default_color),
        );
        converted.texture = material.texture.clone();
        converted.specular = material.specular;
        converted.shininess = material.shininess;
        model.add_material(converted);
    }

    let ctx = Context {
        document,
        bundle,
        registry,
        options,
    };
    convert_body(&document.worldbody, None, &mut model, &ctx)?;

    for (index, equality) in document.equalities.iter().enumerate() {
        model.add_constraint(convert_equality(equality, index));
    }

    model.root_link = model.compute_root();
    if let Err(errors) = model.validate() {
        let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(AdapterError::Conversion(summary.join("; ")));
    }
    model.update_world_transforms();
    model
        .metadata
        .insert("format".into(), serde_json::Value::from("mjcf"));
    model
        .metadata
        .insert("timestep".into(), serde_json::Value::from(document.timestep));

    info!(
        name = %model.name,
        links = model.link_count(),
        joints = model.joint_count(),
        constraints = model.constraints.len(),
        "converted MJCF model"
    );
    Ok(model)
}

struct Context<'a> {
    document: &'a MjcfDocument,
    bundle: &'a FileBundle,
    registry: &'a MeshDecoderRegistry,
    options: &'a MjcfOptions,
}

// ============== Body tree ==============

fn convert_body(
    body: &MjcfBody,
    parent: Option<&str>,
    model: &mut UnifiedRobotModel,
    ctx: &Context,
) -> AdapterResult<()> {
    let mut link = Link::new(&body.name);
    for geom in &body.geoms {
        attach_geom(&mut link, geom, ctx);
    }
    if let Some(inertial) = &body.inertial {
        link.inertial = convert_inertial(inertial);
    }
    model
        .add_link(link)
        .map_err(|e| AdapterError::Conversion(e.to_string()))?;

    if let Some(parent) = parent {
        model
            .add_joint(convert_joint(body, parent))
            .map_err(|e| AdapterError::Conversion(e.to_string()))?;
    }
    for child in &body.children {
        convert_body(child, Some(&body.name), model, ctx)?;
    }
    Ok(())
}

/// The joint connecting `body` to its parent. Bodies without joints are
/// welded in place; bodies with several joints keep only the first, which
/// is all the viewer's single-value kinematics can drive.
fn convert_joint(body: &MjcfBody, parent: &str) -> Joint {
    let origin = placement_origin(body.pos, body.quat, body.euler);
    let Some(primary) = body.joints.first() else {
        return JointBuilder::new(format!("{}_fixed", body.name), parent, &body.name)
            .fixed()
            .origin(origin)
            .build();
    };
    if body.joints.len() > 1 {
        warn!(
            body = %body.name,
            joints = body.joints.len(),
            "body has multiple joints, keeping the first"
        );
    }
    let joint_type = match primary.kind {
        MjcfJointKind::Hinge if primary.range.is_some() => JointType::Revolute,
        MjcfJointKind::Hinge => JointType::Continuous,
        MjcfJointKind::Slide => JointType::Prismatic,
        MjcfJointKind::Free | MjcfJointKind::Ball => JointType::Floating,
    };
    // Joint anchor offsets within the body frame stay unapplied; the
    // viewer poses whole bodies.
    let mut builder = JointBuilder::new(&primary.name, parent, &body.name)
        .joint_type(joint_type)
        .origin(origin)
        .axis_xyz(
            primary.axis[0] as f32,
            primary.axis[1] as f32,
            primary.axis[2] as f32,
        );
    if let Some(range) = primary.range
        && matches!(joint_type, JointType::Revolute | JointType::Prismatic)
    {
        builder = builder.limits(JointLimits::new(range[0] as f32, range[1] as f32));
    }
    if primary.damping != 0.0 {
        builder = builder.dynamics(primary.damping as f32, 0.0);
    }
    builder.build()
}

// ============== Geoms ==============

fn attach_geom(link: &mut Link, geom: &MjcfGeom, ctx: &Context) {
    let (geometry, origin) = convert_geometry(geom, ctx.document);
    let decoded_mesh = decode_geom_mesh(geom, ctx);
    let name = (!geom.name.is_empty()).then(|| geom.name.clone());
    if geom.group >= COLLISION_GROUP {
        link.collisions.push(CollisionGeometry {
            name,
            origin,
            geometry,
            decoded_mesh,
        });
    } else {
        link.visuals.push(VisualGeometry {
            name,
            origin,
            geometry,
            material_name: geom.material.clone(),
            color: geom_color(geom, ctx),
            decoded_mesh,
        });
    }
}

fn geom_color(geom: &MjcfGeom, ctx: &Context) -> [f32; 4] {
    if let Some(rgba) = geom.rgba {
        return rgba;
    }
    if let Some(name) = &geom.material
        && let Some(material) = ctx.document.materials.iter().find(|m| &m.name == name)
        && let Some(rgba) = material.rgba
    {
        return rgba;
    }
    ctx.options.default_color
}

/// Translate geom shape and placement. MJCF sizes are radii and
/// half-lengths, so boxes double into full extents and capsule and
/// cylinder lengths double out of their half-length.
fn convert_geometry(geom: &MjcfGeom, document: &MjcfDocument) -> (GeometryType, Origin) {
    if let Some(ft) = geom.fromto {
        return fromto_geometry(geom, ft);
    }
    let origin = placement_origin(geom.pos, geom.quat, geom.euler);
    let size = geom.size.map(|v| v as f32);
    let geometry = match geom.kind {
        MjcfGeomKind::Plane => GeometryType::Plane {
            size: [size[0], size[1]],
        },
        MjcfGeomKind::Sphere => GeometryType::Sphere { radius: size[0] },
        MjcfGeomKind::Capsule => GeometryType::Capsule {
            radius: size[0],
            length: 2.0 * size[1],
        },
        MjcfGeomKind::Cylinder => GeometryType::Cylinder {
            radius: size[0],
            length: 2.0 * size[1],
        },
        MjcfGeomKind::Ellipsoid => GeometryType::Ellipsoid {
            radii: [size[0], size[1], size[2]],
        },
        MjcfGeomKind::Box => GeometryType::Box {
            size: [2.0 * size[0], 2.0 * size[1], 2.0 * size[2]],
        },
        MjcfGeomKind::Mesh => GeometryType::Mesh {
            filename: mesh_reference(geom, document).unwrap_or_default(),
            scale: mesh_scale(geom, document),
        },
    };
    (geometry, origin)
}

/// Endpoint form: midpoint placement, oriented from the local z axis onto
/// the segment direction.
fn fromto_geometry(geom: &MjcfGeom, ft: [f64; 6]) -> (GeometryType, Origin) {
    let a = Vec3::new(ft[0] as f32, ft[1] as f32, ft[2] as f32);
    let b = Vec3::new(ft[3] as f32, ft[4] as f32, ft[5] as f32);
    let radius = geom.size[0] as f32;
    let length = a.distance(b);
    let geometry = match geom.kind {
        MjcfGeomKind::Cylinder => GeometryType::Cylinder { radius, length },
        _ => GeometryType::Capsule { radius, length },
    };
    let mid = (a + b) * 0.5;
    let mut origin = Origin::new([mid.x, mid.y, mid.z], [0.0; 3]);
    if length > f32::EPSILON {
        origin.quat = Some(Quat::from_rotation_arc(Vec3::Z, (b - a) / length));
    }
    (geometry, origin)
}

fn placement_origin(pos: [f64; 3], quat: Option<[f64; 4]>, euler: Option<[f64; 3]>) -> Origin {
    let mut origin = Origin::new(
        pos.map(|v| v as f32),
        euler.map(|e| e.map(|v| v as f32)).unwrap_or_default(),
    );
    if let Some(q) = quat {
        // MJCF stores quaternions as [w, x, y, z].
        origin.quat = Some(Quat::from_xyzw(
            q[1] as f32,
            q[2] as f32,
            q[3] as f32,
            q[0] as f32,
        ));
    }
    origin
}

// ============== Mesh assets ==============

fn mesh_asset<'d>(geom: &MjcfGeom, document: &'d MjcfDocument) -> Option<&'d MjcfMeshAsset> {
    let name = geom.mesh.as_deref()?;
    document.meshes.iter().find(|m| m.name == name)
}

fn mesh_reference(geom: &MjcfGeom, document: &MjcfDocument) -> Option<String> {
    mesh_asset(geom, document)
        .map(|m| m.file.clone())
        .or_else(|| geom.mesh.clone())
}

fn mesh_scale(geom: &MjcfGeom, document: &MjcfDocument) -> Option<Vec3> {
    let scale = mesh_asset(geom, document)?.scale;
    if scale == [1.0; 3] {
        None
    } else {
        Some(Vec3::new(scale[0] as f32, scale[1] as f32, scale[2] as f32))
    }
}

fn resolve_mesh(reference: &str, ctx: &Context) -> Option<ResolvedAsset> {
    if let Some(dir) = &ctx.document.compiler.mesh_dir {
        let joined = format!("{dir}/{reference}");
        if let Some(asset) = resolver::resolve(&joined, ctx.bundle, &ctx.options.context_dir) {
            return Some(asset);
        }
    }
    resolver::resolve(reference, ctx.bundle, &ctx.options.context_dir)
}

fn decode_geom_mesh(geom: &MjcfGeom, ctx: &Context) -> Option<Arc<MeshData>> {
    if geom.kind != MjcfGeomKind::Mesh {
        return None;
    }
    let reference = mesh_reference(geom, ctx.document)?;
    let Some(resolved) = resolve_mesh(&reference, ctx) else {
        warn!(reference = %reference, "mesh not found in bundle, rendering placeholder");
        return None;
    };
    match ctx.registry.decode(&resolved.path, &resolved.bytes) {
        Ok(mut mesh) => {
            if let Some(scale) = mesh_scale(geom, ctx.document) {
                mesh.apply_scale(scale);
            }
            Some(Arc::new(mesh))
        }
        Err(e) => {
            warn!(reference = %reference, error = %e, "mesh decode failed, rendering placeholder");
            None
        }
    }
}

// ============== Inertia and constraints ==============

fn convert_inertial(inertial: &MjcfInertial) -> Option<InertialProperties> {
    let inertia = if let Some(d) = inertial.diaginertia {
        InertiaTensor::from_diagonal(d[0] as f32, d[1] as f32, d[2] as f32)
    } else if let Some(f) = inertial.fullinertia {
        InertiaTensor {
            ixx: f[0] as f32,
            iyy: f[1] as f32,
            izz: f[2] as f32,
            ixy: f[3] as f32,
            ixz: f[4] as f32,
            iyz: f[5] as f32,
        }
    } else {
        InertiaTensor::default()
    };
    let properties = InertialProperties {
        origin: Origin::new(inertial.pos.map(|v| v as f32), [0.0; 3]),
        mass: inertial.mass as f32,
        inertia,
    };
    if properties.is_zero() {
        None
    } else {
        Some(properties)
    }
}

fn convert_equality(equality: &MjcfEquality, index: usize) -> Constraint {
    let name = |prefix: &str| {
        equality
            .name
            .clone()
            .unwrap_or_else(|| format!("{prefix}_{index}"))
    };
    let body = |value: &Option<String>| value.clone().unwrap_or_default();
    match equality.kind {
        MjcfEqualityKind::Connect => {
            let anchor = equality.anchor.unwrap_or_default();
            Constraint::connect(
                name("connect"),
                body(&equality.body1),
                body(&equality.body2),
                Vec3::new(anchor[0] as f32, anchor[1] as f32, anchor[2] as f32),
            )
        }
        MjcfEqualityKind::Weld => Constraint::weld(
            name("weld"),
            body(&equality.body1),
            body(&equality.body2),
            equality.torquescale.map(|t| t as f32),
        ),
        MjcfEqualityKind::Joint => Constraint::joint_coupling(
            name("joint"),
            equality.joint1.clone().unwrap_or_default(),
            equality.joint2.clone(),
            equality
                .polycoef
                .map(|p| p.map(|x| x as f32))
                .unwrap_or([0.0; 5]),
        ),
        MjcfEqualityKind::Distance => Constraint::distance(
            name("distance"),
            body(&equality.body1),
            body(&equality.body2),
            equality.distance.map(|d| d as f32),
        ),
    }
}
