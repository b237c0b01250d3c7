//! Links and their visual, collision, and inertial elements

use std::sync::Arc;

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::geometry::GeometryType;
use crate::inertia::InertiaTensor;
use crate::material::Material;
use crate::mesh::MeshData;
use crate::origin::Origin;
use crate::render::RenderHandle;

/// A rigid body segment of the kinematic tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub visuals: Vec<VisualGeometry>,
    pub collisions: Vec<CollisionGeometry>,
    pub inertial: Option<InertialProperties>,
    /// World transform computed by forward kinematics. Not persisted.
    #[serde(skip)]
    pub world_transform: Mat4,
    /// Handle to this link's render subtree, when one is attached.
    #[serde(skip)]
    pub render: Option<RenderHandle>,
}

impl Link {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_visual(mut self, visual: VisualGeometry) -> Self {
        self.visuals.push(visual);
        self
    }

    pub fn with_collision(mut self, collision: CollisionGeometry) -> Self {
        self.collisions.push(collision);
        self
    }

    pub fn with_inertial(mut self, inertial: InertialProperties) -> Self {
        self.inertial = Some(inertial);
        self
    }

    pub fn has_geometry(&self) -> bool {
        !self.visuals.is_empty() || !self.collisions.is_empty()
    }
}

/// One displayable shape on a link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualGeometry {
    pub name: Option<String>,
    pub origin: Origin,
    pub geometry: GeometryType,
    /// Name of a shared material, resolved against the model's table.
    pub material_name: Option<String>,
    /// Resolved display color.
    pub color: [f32; 4],
    /// Decoded buffers for mesh geometry. Empty when decoding failed or the
    /// referenced file was missing; the element still renders a placeholder.
    #[serde(skip)]
    pub decoded_mesh: Option<Arc<MeshData>>,
}

impl Default for VisualGeometry {
    fn default() -> Self {
        Self {
            name: None,
            origin: Origin::default(),
            geometry: GeometryType::default(),
            material_name: None,
            color: Material::DEFAULT_COLOR,
            decoded_mesh: None,
        }
    }
}

impl VisualGeometry {
    pub fn new(geometry: GeometryType) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }
}

/// One collision shape on a link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollisionGeometry {
    pub name: Option<String>,
    pub origin: Origin,
    pub geometry: GeometryType,
    #[serde(skip)]
    pub decoded_mesh: Option<Arc<MeshData>>,
}

impl CollisionGeometry {
    pub fn new(geometry: GeometryType) -> Self {
        Self {
            geometry,
            ..Default::default()
        }
    }
}

/// Mass properties of a link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InertialProperties {
    pub origin: Origin,
    /// Mass in kilograms.
    pub mass: f32,
    pub inertia: InertiaTensor,
}

impl InertialProperties {
    pub fn new(mass: f32, inertia: InertiaTensor) -> Self {
        Self {
            origin: Origin::default(),
            mass,
            inertia,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.mass == 0.0 && self.inertia == InertiaTensor::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_builder() {
        let link = Link::new("base")
            .with_visual(VisualGeometry::new(GeometryType::Sphere { radius: 0.2 }))
            .with_inertial(InertialProperties::new(
                1.5,
                InertiaTensor::from_diagonal(0.1, 0.1, 0.1),
            ));
        assert_eq!(link.name, "base");
        assert!(link.has_geometry());
        assert_eq!(link.inertial.unwrap().mass, 1.5);
        assert_eq!(link.world_transform, Mat4::IDENTITY);
    }

    #[test]
    fn test_empty_link_has_no_geometry() {
        assert!(!Link::new("empty").has_geometry());
    }

    #[test]
    fn test_zero_inertial() {
        assert!(InertialProperties::default().is_zero());
        assert!(!InertialProperties::new(1.0, InertiaTensor::default()).is_zero());
    }
}
