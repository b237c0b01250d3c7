//! Geometry descriptors for visual and collision elements

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Shape of a visual or collision element.
///
/// `Mesh` carries the unresolved file reference from the source document;
/// decoding into buffers happens in the asset layer and the result is
/// attached to the owning element, never stored here. Cloning a value is
/// always a deep copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeometryType {
    /// Full edge lengths in meters.
    Box { size: [f32; 3] },
    Sphere { radius: f32 },
    Cylinder { radius: f32, length: f32 },
    /// `length` is the cylindrical section, excluding the end caps.
    Capsule { radius: f32, length: f32 },
    /// Full extents of a ground plane patch.
    Plane { size: [f32; 2] },
    Ellipsoid { radii: [f32; 3] },
    Mesh {
        filename: String,
        scale: Option<Vec3>,
    },
}

impl Default for GeometryType {
    fn default() -> Self {
        GeometryType::Box {
            size: [0.1, 0.1, 0.1],
        }
    }
}

impl GeometryType {
    pub fn mesh(filename: impl Into<String>) -> Self {
        GeometryType::Mesh {
            filename: filename.into(),
            scale: None,
        }
    }

    pub fn is_mesh(&self) -> bool {
        matches!(self, GeometryType::Mesh { .. })
    }

    pub fn mesh_filename(&self) -> Option<&str> {
        match self {
            GeometryType::Mesh { filename, .. } => Some(filename),
            _ => None,
        }
    }

    /// Short name used in log messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            GeometryType::Box { .. } => "box",
            GeometryType::Sphere { .. } => "sphere",
            GeometryType::Cylinder { .. } => "cylinder",
            GeometryType::Capsule { .. } => "capsule",
            GeometryType::Plane { .. } => "plane",
            GeometryType::Ellipsoid { .. } => "ellipsoid",
            GeometryType::Mesh { .. } => "mesh",
        }
    }
}
