//! MJCF parsing: includes, default classes, body tree

use std::collections::HashMap;

use rovi_assets::{FileBundle, resolver};

use super::types::{
    DEFAULT_TIMESTEP, MjcfBody, MjcfCompiler, MjcfDocument, MjcfEquality, MjcfEqualityKind,
    MjcfGeom, MjcfGeomKind, MjcfInertial, MjcfJoint, MjcfJointKind, MjcfMaterial, MjcfMeshAsset,
};
use crate::error::{AdapterError, AdapterResult};
use crate::xml::{XmlChild, XmlNode, parse_document};

const MAX_INCLUDE_DEPTH: usize = 16;

/// Parse MJCF text into the document structure. Includes are spliced from
/// the bundle, default classes are applied, angles come out in radians.
pub fn parse_mjcf(text: &str, bundle: &FileBundle) -> AdapterResult<MjcfDocument> {
    let mut root = parse_document(text).map_err(|e| AdapterError::Parse(e.to_string()))?;
    if root.tag != "mujoco" {
        return Err(AdapterError::Parse(format!(
            "expected <mujoco> root, found <{}>",
            root.tag
        )));
    }
    expand_includes(&mut root, bundle, 0)?;
    build_document(&root)
}

/// Splice `<include file="...">` elements with the children of the
/// referenced document's root.
fn expand_includes(node: &mut XmlNode, bundle: &FileBundle, depth: usize) -> AdapterResult<()> {
    if depth > MAX_INCLUDE_DEPTH {
        return Err(AdapterError::Parse("include nesting too deep".into()));
    }
    let mut index = 0;
    while index < node.children.len() {
        let replacement = match &node.children[index] {
            XmlChild::Element(e) if e.tag == "include" => {
                let file = e
                    .attr("file")
                    .ok_or_else(|| AdapterError::Parse("<include> without file".into()))?;
                let text = find_file(bundle, file).ok_or_else(|| {
                    AdapterError::AssetResolution(format!("include '{file}' not found in bundle"))
                })?;
                let mut included =
                    parse_document(&text).map_err(|e| AdapterError::Parse(e.to_string()))?;
                expand_includes(&mut included, bundle, depth + 1)?;
                Some(included.children)
            }
            _ => None,
        };
        match replacement {
            Some(children) => {
                let count = children.len();
                node.children.splice(index..=index, children);
                index += count;
            }
            None => {
                if let XmlChild::Element(e) = &mut node.children[index] {
                    expand_includes(e, bundle, depth)?;
                }
                index += 1;
            }
        }
    }
    Ok(())
}

fn find_file(bundle: &FileBundle, reference: &str) -> Option<String> {
    let normalized = resolver::normalize_reference(reference);
    if let Some(text) = bundle.text(&normalized) {
        return Some(text);
    }
    let want = resolver::basename(&normalized);
    bundle
        .keys()
        .find(|key| resolver::basename(key).eq_ignore_ascii_case(want))
        .and_then(|key| bundle.text(key))
}

fn build_document(root: &XmlNode) -> AdapterResult<MjcfDocument> {
    let compiler = parse_compiler(root.child("compiler"));
    let defaults = Defaults::collect(root);
    let timestep = root
        .child("option")
        .and_then(|o| attr_f64(o, "timestep"))
        .unwrap_or(DEFAULT_TIMESTEP);

    let mut counter = 0usize;
    let worldbody = match root.child("worldbody") {
        Some(w) => parse_body(w, "world", &compiler, &defaults, "", &mut counter)?,
        None => MjcfBody {
            name: "world".into(),
            ..Default::default()
        },
    };

    let mut materials = Vec::new();
    let mut meshes = Vec::new();
    if let Some(asset) = root.child("asset") {
        for m in asset.children_named("material") {
            materials.push(parse_material(m));
        }
        for m in asset.children_named("mesh") {
            meshes.push(parse_mesh_asset(m));
        }
    }
    let equalities = root
        .child("equality")
        .map(parse_equalities)
        .unwrap_or_default();

    Ok(MjcfDocument {
        model_name: root.attr("model").unwrap_or("mujoco").to_string(),
        compiler,
        timestep,
        worldbody,
        materials,
        meshes,
        equalities,
    })
}

fn parse_compiler(element: Option<&XmlNode>) -> MjcfCompiler {
    let mut compiler = MjcfCompiler::default();
    if let Some(e) = element {
        if let Some(angle) = e.attr("angle") {
            compiler.angle_degrees = angle != "radian";
        }
        compiler.mesh_dir = e.attr("meshdir").map(str::to_string);
        compiler.texture_dir = e.attr("texturedir").map(str::to_string);
    }
    compiler
}

// ============== Default classes ==============

/// Flattened `<default>` class table: each class carries the merged
/// attribute sets of itself and its ancestors, keyed by element tag.
#[derive(Debug, Default)]
struct Defaults {
    classes: HashMap<String, DefaultClass>,
}

#[derive(Debug, Clone, Default)]
struct DefaultClass {
    by_element: HashMap<String, HashMap<String, String>>,
}

impl Defaults {
    fn collect(root: &XmlNode) -> Self {
        let mut defaults = Defaults::default();
        for d in root.children_named("default") {
            Self::walk(d, DefaultClass::default(), &mut defaults.classes);
        }
        defaults
    }

    fn walk(
        node: &XmlNode,
        mut inherited: DefaultClass,
        classes: &mut HashMap<String, DefaultClass>,
    ) {
        for child in node.elements() {
            if child.tag != "default" {
                let slot = inherited.by_element.entry(child.tag.clone()).or_default();
                for (k, v) in &child.attrs {
                    slot.insert(k.clone(), v.clone());
                }
            }
        }
        let class = node.attr("class").unwrap_or("").to_string();
        classes.insert(class, inherited.clone());
        for child in node.children_named("default") {
            Self::walk(child, inherited.clone(), classes);
        }
    }

    /// Element attribute, falling back to the class defaults and then the
    /// unnamed root default.
    fn attr(&self, element: &XmlNode, class: &str, name: &str) -> Option<String> {
        if let Some(v) = element.attr(name) {
            return Some(v.to_string());
        }
        let lookup = |cls: &str| {
            self.classes
                .get(cls)
                .and_then(|c| c.by_element.get(&element.tag))
                .and_then(|m| m.get(name))
                .cloned()
        };
        lookup(class).or_else(|| {
            if class.is_empty() {
                None
            } else {
                lookup("")
            }
        })
    }
}

// ============== Body tree ==============

fn parse_body(
    element: &XmlNode,
    name_hint: &str,
    compiler: &MjcfCompiler,
    defaults: &Defaults,
    class_scope: &str,
    counter: &mut usize,
) -> AdapterResult<MjcfBody> {
    let class_scope = element.attr("childclass").unwrap_or(class_scope);
    let mut body = MjcfBody {
        name: body_name(element, name_hint, counter),
        pos: attr_n::<3>(element, "pos").unwrap_or_default(),
        quat: attr_n::<4>(element, "quat"),
        euler: attr_n::<3>(element, "euler").map(|e| to_radians(e, compiler)),
        ..Default::default()
    };
    for child in element.elements() {
        match child.tag.as_str() {
            "geom" => body
                .geoms
                .push(parse_geom(child, compiler, defaults, class_scope)?),
            "joint" => body
                .joints
                .push(parse_joint(child, compiler, defaults, class_scope, counter)?),
            "freejoint" => body.joints.push(MjcfJoint {
                name: joint_name(child, counter),
                kind: MjcfJointKind::Free,
                pos: [0.0; 3],
                axis: [0.0, 0.0, 1.0],
                range: None,
                damping: 0.0,
            }),
            "inertial" => body.inertial = Some(parse_inertial(child)),
            "body" => {
                let nested = parse_body(child, "", compiler, defaults, class_scope, counter)?;
                body.children.push(nested);
            }
            _ => {}
        }
    }
    Ok(body)
}

fn body_name(element: &XmlNode, hint: &str, counter: &mut usize) -> String {
    if let Some(name) = element.attr("name") {
        return name.to_string();
    }
    if !hint.is_empty() {
        return hint.to_string();
    }
    *counter += 1;
    format!("body_{counter}")
}

fn joint_name(element: &XmlNode, counter: &mut usize) -> String {
    if let Some(name) = element.attr("name") {
        return name.to_string();
    }
    *counter += 1;
    format!("joint_{counter}")
}

fn parse_geom(
    element: &XmlNode,
    compiler: &MjcfCompiler,
    defaults: &Defaults,
    class_scope: &str,
) -> AdapterResult<MjcfGeom> {
    let class = element.attr("class").unwrap_or(class_scope);
    let get = |name: &str| defaults.attr(element, class, name);
    let kind = match get("type") {
        Some(t) => MjcfGeomKind::parse(&t)
            .ok_or_else(|| AdapterError::Parse(format!("unknown geom type '{t}'")))?,
        None => MjcfGeomKind::default(),
    };
    Ok(MjcfGeom {
        name: element.attr("name").unwrap_or("").to_string(),
        kind,
        size: get("size").map(|s| parse_padded3(&s)).unwrap_or_default(),
        fromto: get("fromto").and_then(|s| parse_n::<6>(&s)),
        pos: get("pos").and_then(|s| parse_n::<3>(&s)).unwrap_or_default(),
        quat: get("quat").and_then(|s| parse_n::<4>(&s)),
        euler: get("euler")
            .and_then(|s| parse_n::<3>(&s))
            .map(|e| to_radians(e, compiler)),
        rgba: get("rgba")
            .and_then(|s| parse_n::<4>(&s))
            .map(|v| v.map(|x| x as f32)),
        material: get("material"),
        mesh: get("mesh"),
        group: get("group").and_then(|s| s.trim().parse().ok()).unwrap_or(0),
    })
}

fn parse_joint(
    element: &XmlNode,
    compiler: &MjcfCompiler,
    defaults: &Defaults,
    class_scope: &str,
    counter: &mut usize,
) -> AdapterResult<MjcfJoint> {
    let class = element.attr("class").unwrap_or(class_scope);
    let get = |name: &str| defaults.attr(element, class, name);
    let kind = match get("type") {
        Some(t) => MjcfJointKind::parse(&t)
            .ok_or_else(|| AdapterError::Parse(format!("unknown joint type '{t}'")))?,
        None => MjcfJointKind::Hinge,
    };
    let mut range = get("range").and_then(|s| parse_n::<2>(&s));
    if kind.is_angular() && compiler.angle_degrees {
        range = range.map(|r| r.map(f64::to_radians));
    }
    Ok(MjcfJoint {
        name: joint_name(element, counter),
        kind,
        pos: get("pos").and_then(|s| parse_n::<3>(&s)).unwrap_or_default(),
        axis: get("axis")
            .and_then(|s| parse_n::<3>(&s))
            .unwrap_or([0.0, 0.0, 1.0]),
        range,
        damping: get("damping").and_then(|s| s.trim().parse().ok()).unwrap_or(0.0),
    })
}

fn parse_inertial(element: &XmlNode) -> MjcfInertial {
    MjcfInertial {
        pos: attr_n::<3>(element, "pos").unwrap_or_default(),
        mass: attr_f64(element, "mass").unwrap_or(0.0),
        diaginertia: attr_n::<3>(element, "diaginertia"),
        fullinertia: attr_n::<6>(element, "fullinertia"),
    }
}

fn parse_material(element: &XmlNode) -> MjcfMaterial {
    MjcfMaterial {
        name: element.attr("name").unwrap_or("").to_string(),
        rgba: attr_n::<4>(element, "rgba").map(|v| v.map(|x| x as f32)),
        texture: element.attr("texture").map(str::to_string),
        specular: attr_f64(element, "specular").map(|v| v as f32),
        shininess: attr_f64(element, "shininess").map(|v| v as f32),
    }
}

fn parse_mesh_asset(element: &XmlNode) -> MjcfMeshAsset {
    let file = element.attr("file").unwrap_or("").to_string();
    let name = match element.attr("name") {
        Some(name) => name.to_string(),
        // Default asset name is the file stem.
        None => {
            let base = resolver::basename(&file);
            match base.rsplit_once('.') {
                Some((stem, _)) => stem.to_string(),
                None => base.to_string(),
            }
        }
    };
    MjcfMeshAsset {
        name,
        file,
        scale: attr_n::<3>(element, "scale").unwrap_or([1.0; 3]),
    }
}

fn parse_equalities(element: &XmlNode) -> Vec<MjcfEquality> {
    element
        .elements()
        .filter_map(|e| {
            let kind = match e.tag.as_str() {
                "connect" => MjcfEqualityKind::Connect,
                "weld" => MjcfEqualityKind::Weld,
                "joint" => MjcfEqualityKind::Joint,
                "distance" => MjcfEqualityKind::Distance,
                _ => return None,
            };
            Some(MjcfEquality {
                kind,
                name: e.attr("name").map(str::to_string),
                body1: e.attr("body1").map(str::to_string),
                body2: e.attr("body2").map(str::to_string),
                joint1: e.attr("joint1").map(str::to_string),
                joint2: e.attr("joint2").map(str::to_string),
                anchor: attr_n::<3>(e, "anchor"),
                torquescale: attr_f64(e, "torquescale"),
                polycoef: attr_n::<5>(e, "polycoef"),
                distance: attr_f64(e, "distance"),
            })
        })
        .collect()
}

// ============== Attribute parsing ==============

fn attr_f64(element: &XmlNode, name: &str) -> Option<f64> {
    element.attr(name).and_then(|v| v.trim().parse().ok())
}

fn attr_n<const N: usize>(element: &XmlNode, name: &str) -> Option<[f64; N]> {
    element.attr(name).and_then(parse_n::<N>)
}

/// Exactly `N` whitespace-separated floats.
fn parse_n<const N: usize>(text: &str) -> Option<[f64; N]> {
    let mut values = [0.0; N];
    let mut parts = text.split_whitespace();
    for v in &mut values {
        *v = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(values)
}

/// Up to three floats, zero-padded. Geom sizes omit trailing components.
fn parse_padded3(text: &str) -> [f64; 3] {
    let mut values = [0.0; 3];
    for (slot, part) in values.iter_mut().zip(text.split_whitespace()) {
        *slot = part.parse().unwrap_or(0.0);
    }
    values
}

fn to_radians(angles: [f64; 3], compiler: &MjcfCompiler) -> [f64; 3] {
    if compiler.angle_degrees {
        angles.map(f64::to_radians)
    } else {
        angles
    }
}
