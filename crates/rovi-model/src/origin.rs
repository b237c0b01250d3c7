//! Origin transforms for links, joints, and geometry elements

use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Translation plus orientation of an element relative to its parent frame.
///
/// Orientation is carried as a roll-pitch-yaw triple and optionally as an
/// explicit quaternion. When the quaternion is present it takes precedence;
/// adapters for quaternion-native formats set it, URDF-style adapters leave
/// it empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Origin {
    /// Translation in meters.
    pub xyz: [f32; 3],
    /// Roll, pitch, yaw in radians, applied about the fixed parent axes.
    pub rpy: [f32; 3],
    /// Explicit orientation overriding `rpy` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quat: Option<Quat>,
}

impl Origin {
    pub fn new(xyz: [f32; 3], rpy: [f32; 3]) -> Self {
        Self {
            xyz,
            rpy,
            quat: None,
        }
    }

    pub fn from_position(xyz: [f32; 3]) -> Self {
        Self {
            xyz,
            rpy: [0.0; 3],
            quat: None,
        }
    }

    pub fn from_quat(xyz: [f32; 3], quat: Quat) -> Self {
        Self {
            xyz,
            rpy: [0.0; 3],
            quat: Some(quat),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.xyz)
    }

    /// Orientation as a quaternion.
    ///
    /// The rpy triple uses the URDF fixed-axis convention: yaw about Z,
    /// then pitch about Y, then roll about X, all about the parent axes.
    pub fn rotation(&self) -> Quat {
        match self.quat {
            Some(q) => q,
            None => Quat::from_euler(EulerRot::ZYX, self.rpy[2], self.rpy[1], self.rpy[0]),
        }
    }

    /// Homogeneous transform of this origin.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation(), self.position())
    }

    pub fn is_identity(&self) -> bool {
        self.xyz == [0.0; 3] && self.rpy == [0.0; 3] && self.quat.is_none()
    }
}
