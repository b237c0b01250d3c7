//! Parsed MJCF document structures

/// Simulation timestep MuJoCo assumes when `<option timestep>` is absent.
pub const DEFAULT_TIMESTEP: f64 = 0.002;

/// A parsed MJCF document, normalized to radians and with defaults and
/// includes already applied.
#[derive(Debug, Clone)]
pub struct MjcfDocument {
    pub model_name: String,
    pub compiler: MjcfCompiler,
    pub timestep: f64,
    pub worldbody: MjcfBody,
    pub materials: Vec<MjcfMaterial>,
    pub meshes: Vec<MjcfMeshAsset>,
    pub equalities: Vec<MjcfEquality>,
}

impl MjcfDocument {
    /// Total geom count across the body tree.
    pub fn geom_count(&self) -> usize {
        fn walk(body: &MjcfBody) -> usize {
            body.geoms.len() + body.children.iter().map(walk).sum::<usize>()
        }
        walk(&self.worldbody)
    }

    /// Body count including the world body.
    pub fn body_count(&self) -> usize {
        fn walk(body: &MjcfBody) -> usize {
            1 + body.children.iter().map(walk).sum::<usize>()
        }
        walk(&self.worldbody)
    }
}

/// `<compiler>` directives the adapter honors.
#[derive(Debug, Clone)]
pub struct MjcfCompiler {
    /// Angles in the source were degrees. The parser already converted
    /// them, this only records the source convention.
    pub angle_degrees: bool,
    pub mesh_dir: Option<String>,
    pub texture_dir: Option<String>,
}

impl Default for MjcfCompiler {
    fn default() -> Self {
        Self {
            // MJCF defaults to degrees.
            angle_degrees: true,
            mesh_dir: None,
            texture_dir: None,
        }
    }
}

/// A rigid body and its subtree.
#[derive(Debug, Clone, Default)]
pub struct MjcfBody {
    pub name: String,
    pub pos: [f64; 3],
    /// Orientation in [w, x, y, z] order when given.
    pub quat: Option<[f64; 4]>,
    /// Fixed-axis euler angles in radians when given.
    pub euler: Option<[f64; 3]>,
    pub joints: Vec<MjcfJoint>,
    pub geoms: Vec<MjcfGeom>,
    pub inertial: Option<MjcfInertial>,
    pub children: Vec<MjcfBody>,
}

#[derive(Debug, Clone)]
pub struct MjcfJoint {
    pub name: String,
    pub kind: MjcfJointKind,
    pub pos: [f64; 3],
    pub axis: [f64; 3],
    /// Limits in radians (hinge) or meters (slide).
    pub range: Option<[f64; 2]>,
    pub damping: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjcfJointKind {
    Free,
    Ball,
    Slide,
    Hinge,
}

impl MjcfJointKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Self::Free),
            "ball" => Some(Self::Ball),
            "slide" => Some(Self::Slide),
            "hinge" => Some(Self::Hinge),
            _ => None,
        }
    }

    pub fn is_angular(&self) -> bool {
        matches!(self, Self::Hinge | Self::Ball)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MjcfGeom {
    pub name: String,
    pub kind: MjcfGeomKind,
    /// Raw MJCF size fields; interpretation depends on `kind`
    /// (radii and half-lengths, not full extents).
    pub size: [f64; 3],
    /// Capsule/cylinder endpoints overriding pos and orientation.
    pub fromto: Option<[f64; 6]>,
    pub pos: [f64; 3],
    pub quat: Option<[f64; 4]>,
    pub euler: Option<[f64; 3]>,
    pub rgba: Option<[f32; 4]>,
    pub material: Option<String>,
    /// Mesh asset name for `kind == Mesh`.
    pub mesh: Option<String>,
    pub group: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MjcfGeomKind {
    Plane,
    #[default]
    Sphere,
    Capsule,
    Ellipsoid,
    Cylinder,
    Box,
    Mesh,
}

impl MjcfGeomKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "plane" => Some(Self::Plane),
            "sphere" => Some(Self::Sphere),
            "capsule" => Some(Self::Capsule),
            "ellipsoid" => Some(Self::Ellipsoid),
            "cylinder" => Some(Self::Cylinder),
            "box" => Some(Self::Box),
            "mesh" => Some(Self::Mesh),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MjcfInertial {
    pub pos: [f64; 3],
    pub mass: f64,
    pub diaginertia: Option<[f64; 3]>,
    /// Full tensor as [ixx, iyy, izz, ixy, ixz, iyz].
    pub fullinertia: Option<[f64; 6]>,
}

#[derive(Debug, Clone, Default)]
pub struct MjcfMaterial {
    pub name: String,
    pub rgba: Option<[f32; 4]>,
    pub texture: Option<String>,
    pub specular: Option<f32>,
    pub shininess: Option<f32>,
}

/// `<asset><mesh>` entry.
#[derive(Debug, Clone)]
pub struct MjcfMeshAsset {
    pub name: String,
    pub file: String,
    pub scale: [f64; 3],
}

/// One element under `<equality>`.
#[derive(Debug, Clone)]
pub struct MjcfEquality {
    pub kind: MjcfEqualityKind,
    pub name: Option<String>,
    pub body1: Option<String>,
    pub body2: Option<String>,
    pub joint1: Option<String>,
    pub joint2: Option<String>,
    pub anchor: Option<[f64; 3]>,
    pub torquescale: Option<f64>,
    pub polycoef: Option<[f64; 5]>,
    pub distance: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MjcfEqualityKind {
    Connect,
    Weld,
    Joint,
    Distance,
}
