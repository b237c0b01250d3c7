//! URDF import: urdf-rs documents into the unified model

use std::sync::Arc;

use glam::Vec3;
use rovi_assets::{FileBundle, MeshDecoderRegistry, resolver};
use rovi_model::{
    CollisionGeometry, GeometryType, InertiaTensor, InertialProperties, Joint, JointBuilder,
    JointLimits, JointMimic, JointType, Link, Material, MeshData, Origin, UnifiedRobotModel,
    VisualGeometry,
};
use tracing::{info, warn};

use crate::error::{AdapterError, AdapterResult};

/// Options for URDF conversion.
#[derive(Debug, Clone)]
pub struct UrdfOptions {
    /// Bundle directory of the source document, for relative references.
    pub context_dir: String,
    /// Color applied when neither the visual nor its material gives one.
    pub default_color: [f32; 4],
}

impl Default for UrdfOptions {
    fn default() -> Self {
        Self {
            context_dir: String::new(),
            default_color: Material::DEFAULT_COLOR,
        }
    }
}

/// Parse URDF text and convert it into a unified model.
pub fn load_urdf(
    text: &str,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &UrdfOptions,
) -> AdapterResult<UnifiedRobotModel> {
    let robot =
        urdf_rs::read_from_string(text).map_err(|e| AdapterError::Parse(e.to_string()))?;
    convert_robot(&robot, bundle, registry, options)
}

/// Convert an already-parsed robot description.
pub fn convert_robot(
    robot: &urdf_rs::Robot,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &UrdfOptions,
) -> AdapterResult<UnifiedRobotModel> {
    if robot.links.is_empty() {
        return Err(AdapterError::Parse("URDF defines no links".into()));
    }

    let mut model = UnifiedRobotModel::new(&robot.name);

    for material in &robot.materials {
        if material.name.is_empty() {
            continue;
        }
        model.add_material(convert_material(material, options.default_color));
    }

    for link in &robot.links {
        let converted = convert_link(link, &model, bundle, registry, options);
        model
            .add_link(converted)
            .map_err(|e| AdapterError::Conversion(e.to_string()))?;
    }

    for joint in &robot.joints {
        model
            .add_joint(convert_joint(joint))
            .map_err(|e| AdapterError::Conversion(e.to_string()))?;
    }

    model.root_link = model.compute_root();
    if let Err(errors) = model.validate() {
        let summary: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(AdapterError::Conversion(summary.join("; ")));
    }
    model.update_world_transforms();

    info!(
        name = %model.name,
        links = model.link_count(),
        joints = model.joint_count(),
        "converted URDF model"
    );
    Ok(model)
}

fn convert_material(material: &urdf_rs::Material, default_color: [f32; 4]) -> Material {
    let rgba = material
        .color
        .as_ref()
        .map(|c| {
            [
                c.rgba.0[0] as f32,
                c.rgba.0[1] as f32,
                c.rgba.0[2] as f32,
                c.rgba.0[3] as f32,
            ]
        })
        .unwrap_or(default_color);
    let mut converted = Material::from_rgba(&material.name, rgba);
    converted.texture = material
        .texture
        .as_ref()
        .map(|t| t.filename.clone())
        .filter(|f| !f.is_empty());
    converted
}

fn convert_link(
    link: &urdf_rs::Link,
    model: &UnifiedRobotModel,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &UrdfOptions,
) -> Link {
    let mut converted = Link::new(&link.name);

    for visual in &link.visual {
        let geometry = convert_geometry(&visual.geometry);
        let color = resolve_visual_color(visual, model, options.default_color);
        let decoded_mesh = decode_mesh(&geometry, bundle, registry, &options.context_dir);
        converted.visuals.push(VisualGeometry {
            name: visual.name.clone(),
            origin: convert_pose(&visual.origin),
            geometry,
            material_name: visual.material.as_ref().map(|m| m.name.clone()),
            color,
            decoded_mesh,
        });
    }

    for collision in &link.collision {
        let geometry = convert_geometry(&collision.geometry);
        let decoded_mesh = decode_mesh(&geometry, bundle, registry, &options.context_dir);
        converted.collisions.push(CollisionGeometry {
            name: collision.name.clone(),
            origin: convert_pose(&collision.origin),
            geometry,
            decoded_mesh,
        });
    }

    let inertial = convert_inertial(&link.inertial);
    if !inertial.is_zero() {
        converted.inertial = Some(inertial);
    }
    converted
}

/// Inline color wins, then the shared material's color, then the default.
fn resolve_visual_color(
    visual: &urdf_rs::Visual,
    model: &UnifiedRobotModel,
    default_color: [f32; 4],
) -> [f32; 4] {
    let Some(material) = &visual.material else {
        return default_color;
    };
    if let Some(color) = &material.color {
        return [
            color.rgba.0[0] as f32,
            color.rgba.0[1] as f32,
            color.rgba.0[2] as f32,
            color.rgba.0[3] as f32,
        ];
    }
    model
        .material(&material.name)
        .map(|m| m.effective_rgba())
        .unwrap_or(default_color)
}

fn convert_geometry(geometry: &urdf_rs::Geometry) -> GeometryType {
    match geometry {
        urdf_rs::Geometry::Box { size } => GeometryType::Box {
            size: [size.0[0] as f32, size.0[1] as f32, size.0[2] as f32],
        },
        urdf_rs::Geometry::Cylinder { radius, length } => GeometryType::Cylinder {
            radius: *radius as f32,
            length: *length as f32,
        },
        urdf_rs::Geometry::Capsule { radius, length } => GeometryType::Capsule {
            radius: *radius as f32,
            length: *length as f32,
        },
        urdf_rs::Geometry::Sphere { radius } => GeometryType::Sphere {
            radius: *radius as f32,
        },
        urdf_rs::Geometry::Mesh { filename, scale } => GeometryType::Mesh {
            filename: filename.clone(),
            scale: scale
                .as_ref()
                .map(|s| Vec3::new(s.0[0] as f32, s.0[1] as f32, s.0[2] as f32)),
        },
    }
}

/// Resolve and decode a mesh reference. Failures degrade to `None` so the
/// rest of the model still loads; the caller renders a placeholder.
fn decode_mesh(
    geometry: &GeometryType,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    context_dir: &str,
) -> Option<Arc<MeshData>> {
    let GeometryType::Mesh { filename, scale } = geometry else {
        return None;
    };
    let Some(resolved) = resolver::resolve(filename, bundle, context_dir) else {
        warn!(reference = %filename, "mesh not found in bundle, rendering placeholder");
        return None;
    };
    match registry.decode(&resolved.path, &resolved.bytes) {
        Ok(mut mesh) => {
            if let Some(scale) = scale {
                mesh.apply_scale(*scale);
            }
            Some(Arc::new(mesh))
        }
        Err(e) => {
            warn!(reference = %filename, error = %e, "mesh decode failed, rendering placeholder");
            None
        }
    }
}

fn convert_pose(pose: &urdf_rs::Pose) -> Origin {
    Origin::new(
        [
            pose.xyz.0[0] as f32,
            pose.xyz.0[1] as f32,
            pose.xyz.0[2] as f32,
        ],
        [
            pose.rpy.0[0] as f32,
            pose.rpy.0[1] as f32,
            pose.rpy.0[2] as f32,
        ],
    )
}

fn convert_joint_type(joint_type: &urdf_rs::JointType) -> JointType {
    match joint_type {
        urdf_rs::JointType::Revolute => JointType::Revolute,
        urdf_rs::JointType::Continuous => JointType::Continuous,
        urdf_rs::JointType::Prismatic => JointType::Prismatic,
        urdf_rs::JointType::Fixed => JointType::Fixed,
        urdf_rs::JointType::Floating => JointType::Floating,
        urdf_rs::JointType::Planar => JointType::Planar,
        // No spherical support in the unified model; treat as floating.
        urdf_rs::JointType::Spherical => JointType::Floating,
    }
}

fn convert_joint(joint: &urdf_rs::Joint) -> Joint {
    let joint_type = convert_joint_type(&joint.joint_type);
    let mut builder = JointBuilder::new(&joint.name, &joint.parent.link, &joint.child.link)
        .joint_type(joint_type)
        .origin(convert_pose(&joint.origin))
        .axis_xyz(
            joint.axis.xyz.0[0] as f32,
            joint.axis.xyz.0[1] as f32,
            joint.axis.xyz.0[2] as f32,
        );

    if matches!(
        joint_type,
        JointType::Revolute | JointType::Prismatic | JointType::Planar
    ) {
        builder = builder.limits(JointLimits {
            lower: joint.limit.lower as f32,
            upper: joint.limit.upper as f32,
            effort: joint.limit.effort as f32,
            velocity: joint.limit.velocity as f32,
        });
    }

    if let Some(dynamics) = &joint.dynamics {
        builder = builder.dynamics(dynamics.damping as f32, dynamics.friction as f32);
    }

    if let Some(mimic) = &joint.mimic {
        builder = builder.mimic(JointMimic {
            joint: mimic.joint.clone(),
            multiplier: mimic.multiplier.unwrap_or(1.0) as f32,
            offset: mimic.offset.unwrap_or(0.0) as f32,
        });
    }

    builder.build()
}

fn convert_inertial(inertial: &urdf_rs::Inertial) -> InertialProperties {
    InertialProperties {
        origin: convert_pose(&inertial.origin),
        mass: inertial.mass.value as f32,
        inertia: InertiaTensor {
            ixx: inertial.inertia.ixx as f32,
            iyy: inertial.inertia.iyy as f32,
            izz: inertial.inertia.izz as f32,
            ixy: inertial.inertia.ixy as f32,
            ixz: inertial.inertia.ixz as f32,
            iyz: inertial.inertia.iyz as f32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const TWO_LINK_ARM: &str = r#"
<robot name="two_link_arm">
  <link name="base">
    <visual>
      <geometry><box size="0.2 0.2 0.1"/></geometry>
    </visual>
  </link>
  <link name="forearm">
    <visual>
      <origin xyz="0 0 0.25" rpy="0 0 0"/>
      <geometry><cylinder radius="0.05" length="0.5"/></geometry>
    </visual>
    <inertial>
      <mass value="1.0"/>
      <inertia ixx="0.01" iyy="0.01" izz="0.001" ixy="0" ixz="0" iyz="0"/>
    </inertial>
  </link>
  <joint name="shoulder" type="revolute">
    <origin xyz="0 0 0.1" rpy="0 0 0"/>
    <parent link="base"/>
    <child link="forearm"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1.57" upper="1.57" effort="10" velocity="1"/>
  </joint>
</robot>
"#;

    fn load(text: &str) -> UnifiedRobotModel {
        load_urdf(
            text,
            &FileBundle::new(),
            &MeshDecoderRegistry::builtin(),
            &UrdfOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_two_link_arm_structure() {
        let model = load(TWO_LINK_ARM);
        assert_eq!(model.link_count(), 2);
        assert_eq!(model.joint_count(), 1);
        assert_eq!(model.materials.len(), 0);
        assert_eq!(model.root_link.as_deref(), Some("base"));

        let joint = model.joint("shoulder").unwrap();
        assert_eq!(joint.joint_type, JointType::Revolute);
        assert_eq!(joint.parent, "base");
        assert_eq!(joint.child, "forearm");
        assert_relative_eq!(joint.limits.unwrap().lower, -1.57);
        assert_relative_eq!(joint.axis.y, 1.0);
    }

    #[test]
    fn test_world_transforms_computed_on_load() {
        let model = load(TWO_LINK_ARM);
        let forearm = model.link("forearm").unwrap();
        let p = forearm.world_transform.transform_point3(glam::Vec3::ZERO);
        assert_relative_eq!(p.z, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_mesh_degrades_to_placeholder() {
        let text = r#"
<robot name="meshy">
  <link name="base">
    <visual>
      <geometry><mesh filename="package://pkg/meshes/missing.stl"/></geometry>
    </visual>
  </link>
</robot>
"#;
        let model = load(text);
        let visual = &model.link("base").unwrap().visuals[0];
        assert!(visual.geometry.is_mesh());
        assert!(visual.decoded_mesh.is_none());
    }

    #[test]
    fn test_mesh_decoded_from_bundle() {
        let stl = {
            let triangles = vec![stl_io::Triangle {
                normal: stl_io::Normal::new([0.0, 0.0, 1.0]),
                vertices: [
                    stl_io::Vertex::new([0.0, 0.0, 0.0]),
                    stl_io::Vertex::new([1.0, 0.0, 0.0]),
                    stl_io::Vertex::new([0.0, 1.0, 0.0]),
                ],
            }];
            let mut out = Vec::new();
            stl_io::write_stl(&mut out, triangles.iter()).unwrap();
            out
        };
        let mut bundle = FileBundle::new();
        bundle.insert("meshes/tri.stl", stl);

        let text = r#"
<robot name="meshy">
  <link name="base">
    <visual>
      <geometry><mesh filename="package://pkg/meshes/tri.stl" scale="2 2 2"/></geometry>
    </visual>
  </link>
</robot>
"#;
        let model = load_urdf(
            text,
            &bundle,
            &MeshDecoderRegistry::builtin(),
            &UrdfOptions::default(),
        )
        .unwrap();
        let mesh = model.link("base").unwrap().visuals[0]
            .decoded_mesh
            .as_ref()
            .unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        // The URDF scale is baked into the decoded buffers.
        assert_relative_eq!(mesh.vertices[1][0], 2.0);
    }

    #[test]
    fn test_material_resolution_order() {
        let text = r#"
<robot name="colored">
  <material name="shared_red"><color rgba="1 0 0 1"/></material>
  <link name="a">
    <visual>
      <geometry><sphere radius="0.1"/></geometry>
      <material name="shared_red"/>
    </visual>
  </link>
  <link name="b">
    <visual>
      <geometry><sphere radius="0.1"/></geometry>
      <material name="inline"><color rgba="0 1 0 1"/></material>
    </visual>
  </link>
  <link name="c">
    <visual><geometry><sphere radius="0.1"/></geometry></visual>
  </link>
  <joint name="ab" type="fixed"><parent link="a"/><child link="b"/></joint>
  <joint name="ac" type="fixed"><parent link="a"/><child link="c"/></joint>
</robot>
"#;
        let model = load(text);
        assert_eq!(model.link("a").unwrap().visuals[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(model.link("b").unwrap().visuals[0].color, [0.0, 1.0, 0.0, 1.0]);
        assert_eq!(model.link("c").unwrap().visuals[0].color, Material::DEFAULT_COLOR);
    }

    #[test]
    fn test_empty_robot_rejected() {
        let result = load_urdf(
            r#"<robot name="empty"></robot>"#,
            &FileBundle::new(),
            &MeshDecoderRegistry::builtin(),
            &UrdfOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mimic_and_dynamics_carried() {
        let text = r#"
<robot name="gripper">
  <link name="palm"/>
  <link name="left"/>
  <link name="right"/>
  <joint name="drive" type="prismatic">
    <parent link="palm"/><child link="left"/>
    <axis xyz="1 0 0"/>
    <limit lower="0" upper="0.04" effort="10" velocity="0.1"/>
    <dynamics damping="0.5" friction="0.1"/>
  </joint>
  <joint name="follow" type="prismatic">
    <parent link="palm"/><child link="right"/>
    <axis xyz="-1 0 0"/>
    <limit lower="0" upper="0.04" effort="10" velocity="0.1"/>
    <mimic joint="drive" multiplier="1" offset="0"/>
  </joint>
</robot>
"#;
        let model = load(text);
        let follow = model.joint("follow").unwrap();
        assert_eq!(follow.mimic.as_ref().unwrap().joint, "drive");
        let drive = model.joint("drive").unwrap();
        assert_relative_eq!(drive.dynamics.unwrap().damping, 0.5);
    }

    #[test]
    fn test_convert_joint_type_mapping() {
        assert_eq!(
            convert_joint_type(&urdf_rs::JointType::Spherical),
            JointType::Floating
        );
        assert_eq!(
            convert_joint_type(&urdf_rs::JointType::Continuous),
            JointType::Continuous
        );
    }
}
