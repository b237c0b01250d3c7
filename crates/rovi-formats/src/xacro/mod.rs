//! Xacro: the XML templating dialect layered on URDF

mod eval;
mod expand;

pub use eval::{EvalError, Lookup, Value};
pub use expand::XacroError;

use std::collections::HashMap;

use expand::Expander;
use rovi_assets::{FileBundle, MeshDecoderRegistry};
use rovi_model::UnifiedRobotModel;
use tracing::debug;

use crate::error::{AdapterError, AdapterResult};
use crate::urdf::{self, UrdfOptions};
use crate::xml::{XmlChild, XmlNode, parse_document};

/// Options for Xacro expansion.
#[derive(Debug, Clone, Default)]
pub struct XacroOptions {
    /// Bundle directory of the source document, for includes and meshes.
    pub context_dir: String,
    /// Argument overrides. These win over `xacro:arg` defaults.
    pub args: HashMap<String, String>,
}

/// Expand Xacro text into flat URDF text.
pub fn expand_xacro(
    text: &str,
    bundle: &FileBundle,
    options: &XacroOptions,
) -> AdapterResult<String> {
    let document = parse_document(text).map_err(|e| AdapterError::Parse(e.to_string()))?;
    let mut expander = Expander::new(bundle, &options.context_dir, options.args.clone());
    expander.seed_args(&document);
    let mut expanded = expander.expand(&document).map_err(map_xacro_error)?;
    cleanup(&mut expanded);
    debug!(root = %expanded.tag, "expanded xacro document");
    Ok(expanded.to_xml())
}

/// Expand Xacro and convert the result through the URDF adapter.
pub fn load_xacro(
    text: &str,
    bundle: &FileBundle,
    registry: &MeshDecoderRegistry,
    options: &XacroOptions,
) -> AdapterResult<UnifiedRobotModel> {
    let urdf_text = expand_xacro(text, bundle, options)?;
    let urdf_options = UrdfOptions {
        context_dir: options.context_dir.clone(),
        ..UrdfOptions::default()
    };
    urdf::load_urdf(&urdf_text, bundle, registry, &urdf_options)
}

fn map_xacro_error(error: XacroError) -> AdapterError {
    let message = error.to_string();
    match error {
        XacroError::IncludeNotFound(_) => AdapterError::AssetResolution(message),
        _ => AdapterError::Parse(message),
    }
}

/// Post-expansion cleanup: drop elements meaningless outside the source
/// orchestration framework, visual/collision elements whose geometry never
/// materialized, comments, and whitespace-only text.
fn cleanup(node: &mut XmlNode) {
    node.remove_attr("xmlns:xacro");
    node.children.retain_mut(|child| match child {
        XmlChild::Element(e) => {
            if matches!(e.tag.as_str(), "gazebo" | "transmission") {
                return false;
            }
            cleanup(e);
            if matches!(e.tag.as_str(), "visual" | "collision") && !has_geometry(e) {
                return false;
            }
            true
        }
        XmlChild::Text(t) => !t.trim().is_empty(),
        XmlChild::Comment(_) => false,
    });
}

fn has_geometry(element: &XmlNode) -> bool {
    element
        .child("geometry")
        .is_some_and(|g| g.elements().next().is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str, bundle: &FileBundle) -> UnifiedRobotModel {
        load_xacro(
            text,
            bundle,
            &MeshDecoderRegistry::builtin(),
            &XacroOptions::default(),
        )
        .unwrap()
    }

    const MACRO_ARM: &str = r#"
<robot name="arm" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <xacro:property name="seg_length" value="0.4"/>
  <xacro:macro name="segment" params="index parent">
    <link name="seg_${index}">
      <visual>
        <origin xyz="0 0 ${seg_length/2}"/>
        <geometry><cylinder radius="0.03" length="${seg_length}"/></geometry>
      </visual>
    </link>
    <joint name="joint_${index}" type="revolute">
      <origin xyz="0 0 ${seg_length}"/>
      <parent link="${parent}"/>
      <child link="seg_${index}"/>
      <axis xyz="0 1 0"/>
      <limit lower="-1" upper="1" effort="5" velocity="1"/>
    </joint>
  </xacro:macro>
  <link name="base"/>
  <xacro:segment index="1" parent="base"/>
  <xacro:segment index="2" parent="seg_1"/>
  <xacro:segment index="3" parent="seg_2"/>
</robot>
"#;

    const FLAT_ARM: &str = r#"
<robot name="arm">
  <link name="base"/>
  <link name="seg_1">
    <visual>
      <origin xyz="0 0 0.2"/>
      <geometry><cylinder radius="0.03" length="0.4"/></geometry>
    </visual>
  </link>
  <link name="seg_2">
    <visual>
      <origin xyz="0 0 0.2"/>
      <geometry><cylinder radius="0.03" length="0.4"/></geometry>
    </visual>
  </link>
  <link name="seg_3">
    <visual>
      <origin xyz="0 0 0.2"/>
      <geometry><cylinder radius="0.03" length="0.4"/></geometry>
    </visual>
  </link>
  <joint name="joint_1" type="revolute">
    <origin xyz="0 0 0.4"/>
    <parent link="base"/><child link="seg_1"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1" upper="1" effort="5" velocity="1"/>
  </joint>
  <joint name="joint_2" type="revolute">
    <origin xyz="0 0 0.4"/>
    <parent link="seg_1"/><child link="seg_2"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1" upper="1" effort="5" velocity="1"/>
  </joint>
  <joint name="joint_3" type="revolute">
    <origin xyz="0 0 0.4"/>
    <parent link="seg_2"/><child link="seg_3"/>
    <axis xyz="0 1 0"/>
    <limit lower="-1" upper="1" effort="5" velocity="1"/>
  </joint>
</robot>
"#;

    #[test]
    fn test_expansion_matches_manual_preexpansion() {
        let bundle = FileBundle::new();
        let expanded = load(MACRO_ARM, &bundle);
        let manual = urdf::load_urdf(
            FLAT_ARM,
            &bundle,
            &MeshDecoderRegistry::builtin(),
            &UrdfOptions::default(),
        )
        .unwrap();
        assert_eq!(expanded.link_count(), manual.link_count());
        assert_eq!(expanded.joint_count(), manual.joint_count());
        assert_eq!(expanded.root_link, manual.root_link);
    }

    #[test]
    fn test_capitalized_boolean_tokens_compare_to_arg_strings() {
        let doc = r#"
<robot name="shim" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <xacro:arg name="use_tool" default="true"/>
  <link name="base"/>
  <xacro:if value="${'$(arg use_tool)' == True}">
    <link name="tool"/>
    <joint name="mount" type="fixed"><parent link="base"/><child link="tool"/></joint>
  </xacro:if>
</robot>
"#;
        let model = load(doc, &FileBundle::new());
        assert!(model.link("tool").is_some());
        assert_eq!(model.joint_count(), 1);
    }

    #[test]
    fn test_arg_override_wins_over_default() {
        let doc = r#"
<robot name="shim" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <xacro:arg name="extra" default="false"/>
  <link name="base"/>
  <xacro:if value="$(arg extra)">
    <link name="extra"/>
    <joint name="j" type="fixed"><parent link="base"/><child link="extra"/></joint>
  </xacro:if>
</robot>
"#;
        let bundle = FileBundle::new();
        let options = XacroOptions {
            args: HashMap::from([("extra".to_string(), "true".to_string())]),
            ..XacroOptions::default()
        };
        let model = load_xacro(doc, &bundle, &MeshDecoderRegistry::builtin(), &options).unwrap();
        assert!(model.link("extra").is_some());
    }

    #[test]
    fn test_framework_elements_stripped() {
        let doc = r#"
<robot name="g" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <!-- top note -->
  <link name="base"/>
  <gazebo reference="base"><material>Gazebo/Grey</material></gazebo>
  <transmission name="t"><type>simple</type></transmission>
</robot>
"#;
        let text = expand_xacro(doc, &FileBundle::new(), &XacroOptions::default()).unwrap();
        assert!(!text.contains("gazebo"));
        assert!(!text.contains("transmission"));
        assert!(!text.contains("<!--"));
        assert!(!text.contains("xmlns:xacro"));
    }

    #[test]
    fn test_empty_conditional_visual_removed() {
        let doc = r#"
<robot name="c" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <link name="base">
    <visual>
      <geometry>
        <xacro:if value="false"><box size="1 1 1"/></xacro:if>
      </geometry>
    </visual>
  </link>
</robot>
"#;
        let text = expand_xacro(doc, &FileBundle::new(), &XacroOptions::default()).unwrap();
        assert!(!text.contains("<visual"));
        let model = load(doc, &FileBundle::new());
        assert!(model.link("base").unwrap().visuals.is_empty());
    }

    #[test]
    fn test_include_through_bundle_with_context_dir() {
        let mut bundle = FileBundle::new();
        bundle.insert(
            "robots/common.xacro",
            Vec::from(
                &br#"<robot xmlns:xacro="http://www.ros.org/wiki/xacro">
                       <xacro:property name="base_size" value="0.3"/>
                     </robot>"#[..],
            ),
        );
        let doc = r#"
<robot name="inc" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <xacro:include filename="common.xacro"/>
  <link name="base">
    <visual><geometry><box size="${base_size} ${base_size} ${base_size}"/></geometry></visual>
  </link>
</robot>
"#;
        let options = XacroOptions {
            context_dir: "robots".to_string(),
            ..XacroOptions::default()
        };
        let model =
            load_xacro(doc, &bundle, &MeshDecoderRegistry::builtin(), &options).unwrap();
        let visual = &model.link("base").unwrap().visuals[0];
        assert!(
            matches!(visual.geometry, rovi_model::GeometryType::Box { size } if size == [0.3; 3])
        );
    }

    #[test]
    fn test_missing_include_maps_to_asset_resolution_error() {
        let doc = r#"
<robot name="inc" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <xacro:include filename="nowhere.xacro"/>
</robot>
"#;
        let result = expand_xacro(doc, &FileBundle::new(), &XacroOptions::default());
        assert!(matches!(result, Err(AdapterError::AssetResolution(_))));
    }

    #[test]
    fn test_mesh_reference_via_find_substitution() {
        let doc = r#"
<robot name="m" xmlns:xacro="http://www.ros.org/wiki/xacro">
  <link name="base">
    <visual>
      <geometry><mesh filename="$(find my_bot)/meshes/arm.stl"/></geometry>
    </visual>
  </link>
</robot>
"#;
        let model = load(doc, &FileBundle::new());
        assert_eq!(
            model.link("base").unwrap().visuals[0].geometry.mesh_filename(),
            Some("package://my_bot/meshes/arm.stl")
        );
    }
}
