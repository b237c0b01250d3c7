//! Closed-chain equality constraints

use glam::Vec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::render::RenderHandle;

/// Kind of equality constraint between two bodies or joints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintKind {
    /// Ball joint between two bodies at an anchor point.
    Connect,
    /// Rigid attachment between two bodies.
    Weld,
    /// Polynomial coupling between two joint values.
    JointCoupling,
    /// Fixed distance between two bodies.
    Distance,
}

/// Declared equality constraint. These close kinematic loops the joint tree
/// cannot express; the viewer displays them and forwards them to the
/// physics engine untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: Uuid,
    pub name: String,
    pub kind: ConstraintKind,
    pub body1: Option<String>,
    pub body2: Option<String>,
    /// Anchor point in body1's frame for connect constraints.
    pub anchor: Option<Vec3>,
    /// Torque-to-force ratio for weld constraints.
    pub torquescale: Option<f32>,
    pub joint1: Option<String>,
    pub joint2: Option<String>,
    /// Coupling polynomial coefficients, constant term first.
    pub polycoef: Option<[f32; 5]>,
    pub distance: Option<f32>,
    /// Handle to this constraint's visualization, when one is attached.
    #[serde(skip)]
    pub render: Option<RenderHandle>,
}

impl Constraint {
    fn base(name: impl Into<String>, kind: ConstraintKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            body1: None,
            body2: None,
            anchor: None,
            torquescale: None,
            joint1: None,
            joint2: None,
            polycoef: None,
            distance: None,
            render: None,
        }
    }

    pub fn connect(
        name: impl Into<String>,
        body1: impl Into<String>,
        body2: impl Into<String>,
        anchor: Vec3,
    ) -> Self {
        Self {
            body1: Some(body1.into()),
            body2: Some(body2.into()),
            anchor: Some(anchor),
            ..Self::base(name, ConstraintKind::Connect)
        }
    }

    pub fn weld(
        name: impl Into<String>,
        body1: impl Into<String>,
        body2: impl Into<String>,
        torquescale: Option<f32>,
    ) -> Self {
        Self {
            body1: Some(body1.into()),
            body2: Some(body2.into()),
            torquescale,
            ..Self::base(name, ConstraintKind::Weld)
        }
    }

    pub fn joint_coupling(
        name: impl Into<String>,
        joint1: impl Into<String>,
        joint2: Option<String>,
        polycoef: [f32; 5],
    ) -> Self {
        Self {
            joint1: Some(joint1.into()),
            joint2,
            polycoef: Some(polycoef),
            ..Self::base(name, ConstraintKind::JointCoupling)
        }
    }

    pub fn distance(
        name: impl Into<String>,
        body1: impl Into<String>,
        body2: impl Into<String>,
        distance: Option<f32>,
    ) -> Self {
        Self {
            body1: Some(body1.into()),
            body2: Some(body2.into()),
            distance,
            ..Self::base(name, ConstraintKind::Distance)
        }
    }
}
