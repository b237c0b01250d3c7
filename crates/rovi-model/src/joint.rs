//! Joints connecting links into a kinematic tree

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::origin::Origin;

/// Joint taxonomy shared by every format adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointType {
    /// Rotation about `axis`, limited.
    Revolute,
    /// Rotation about `axis`, unlimited.
    Continuous,
    /// Translation along `axis`.
    Prismatic,
    Fixed,
    /// Free or ball attachment. Treated as immobile by viewer kinematics.
    Floating,
    Planar,
}

impl JointType {
    /// Angular joints take radians, prismatic joints take meters.
    pub fn is_angular(&self) -> bool {
        matches!(self, JointType::Revolute | JointType::Continuous)
    }

    pub fn is_movable(&self) -> bool {
        !matches!(self, JointType::Fixed)
    }
}

/// Motion limits for a joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    pub lower: f32,
    pub upper: f32,
    pub effort: f32,
    pub velocity: f32,
}

impl JointLimits {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self {
            lower,
            upper,
            effort: 0.0,
            velocity: 0.0,
        }
    }

    pub fn default_revolute() -> Self {
        Self::new(-std::f32::consts::PI, std::f32::consts::PI)
    }

    pub fn default_prismatic() -> Self {
        Self::new(0.0, 1.0)
    }

    /// True when the range is meaningful for clamping.
    pub fn has_range(&self) -> bool {
        self.upper > self.lower
    }
}

/// Velocity-dependent joint behavior.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JointDynamics {
    pub damping: f32,
    pub friction: f32,
}

/// Coupling of this joint's value to another joint:
/// `value = multiplier * source + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointMimic {
    /// Name of the joint being mimicked.
    pub joint: String,
    pub multiplier: f32,
    pub offset: f32,
}

impl JointMimic {
    pub fn new(joint: impl Into<String>) -> Self {
        Self {
            joint: joint.into(),
            multiplier: 1.0,
            offset: 0.0,
        }
    }

    pub fn with_params(joint: impl Into<String>, multiplier: f32, offset: f32) -> Self {
        Self {
            joint: joint.into(),
            multiplier,
            offset,
        }
    }

    pub fn calculate(&self, source_value: f32) -> f32 {
        self.multiplier * source_value + self.offset
    }
}

/// A connection between a parent link and a child link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    pub joint_type: JointType,
    /// Parent link name.
    pub parent: String,
    /// Child link name.
    pub child: String,
    /// Child frame relative to the parent frame at zero value.
    pub origin: Origin,
    /// Motion axis in the joint frame, normalized.
    pub axis: Vec3,
    pub limits: Option<JointLimits>,
    pub dynamics: Option<JointDynamics>,
    pub mimic: Option<JointMimic>,
    /// Current value: radians for angular joints, meters for prismatic.
    pub current_value: f32,
}

impl Joint {
    pub fn builder(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> JointBuilder {
        JointBuilder::new(name, parent, child)
    }

    pub fn fixed(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
        origin: Origin,
    ) -> Self {
        JointBuilder::new(name, parent, child)
            .fixed()
            .origin(origin)
            .build()
    }

    /// Clamp a candidate value to this joint's limits. Fixed joints pin to
    /// zero and continuous joints never clamp.
    pub fn clamped_value(&self, value: f32) -> f32 {
        match self.joint_type {
            JointType::Fixed => 0.0,
            JointType::Continuous => value,
            _ => match &self.limits {
                Some(l) if l.has_range() => value.clamp(l.lower, l.upper),
                _ => value,
            },
        }
    }

    /// Full local transform: the origin followed by the motion contribution
    /// at the given value.
    pub fn local_transform(&self, value: f32) -> Mat4 {
        self.origin.to_mat4() * compute_joint_transform(self.joint_type, self.axis, value)
    }
}

/// Motion transform contributed by a joint at the given value.
///
/// Floating and planar joints contribute identity; the viewer poses them
/// through the physics bridge instead.
pub fn compute_joint_transform(joint_type: JointType, axis: Vec3, value: f32) -> Mat4 {
    match joint_type {
        JointType::Revolute | JointType::Continuous => {
            let axis = axis.normalize_or_zero();
            if axis == Vec3::ZERO {
                Mat4::IDENTITY
            } else {
                Mat4::from_quat(Quat::from_axis_angle(axis, value))
            }
        }
        JointType::Prismatic => Mat4::from_translation(axis.normalize_or_zero() * value),
        JointType::Fixed | JointType::Floating | JointType::Planar => Mat4::IDENTITY,
    }
}

/// Fluent joint constructor used by adapters and tests.
#[derive(Debug, Clone)]
pub struct JointBuilder {
    joint: Joint,
}

impl JointBuilder {
    pub fn new(
        name: impl Into<String>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            joint: Joint {
                name: name.into(),
                joint_type: JointType::Fixed,
                parent: parent.into(),
                child: child.into(),
                origin: Origin::default(),
                axis: Vec3::Z,
                limits: None,
                dynamics: None,
                mimic: None,
                current_value: 0.0,
            },
        }
    }

    pub fn joint_type(mut self, joint_type: JointType) -> Self {
        self.joint.joint_type = joint_type;
        self
    }

    pub fn fixed(self) -> Self {
        self.joint_type(JointType::Fixed)
    }

    pub fn revolute(self) -> Self {
        self.joint_type(JointType::Revolute)
            .limits(JointLimits::default_revolute())
    }

    pub fn continuous(self) -> Self {
        self.joint_type(JointType::Continuous)
    }

    pub fn prismatic(self) -> Self {
        self.joint_type(JointType::Prismatic)
            .limits(JointLimits::default_prismatic())
    }

    pub fn origin(mut self, origin: Origin) -> Self {
        self.joint.origin = origin;
        self
    }

    pub fn xyz(mut self, x: f32, y: f32, z: f32) -> Self {
        self.joint.origin.xyz = [x, y, z];
        self
    }

    pub fn rpy(mut self, roll: f32, pitch: f32, yaw: f32) -> Self {
        self.joint.origin.rpy = [roll, pitch, yaw];
        self
    }

    pub fn axis(mut self, axis: Vec3) -> Self {
        self.joint.axis = axis.normalize_or_zero();
        self
    }

    pub fn axis_xyz(self, x: f32, y: f32, z: f32) -> Self {
        self.axis(Vec3::new(x, y, z))
    }

    pub fn limits(mut self, limits: JointLimits) -> Self {
        self.joint.limits = Some(limits);
        self
    }

    pub fn limits_range(self, lower: f32, upper: f32) -> Self {
        self.limits(JointLimits::new(lower, upper))
    }

    pub fn dynamics(mut self, damping: f32, friction: f32) -> Self {
        self.joint.dynamics = Some(JointDynamics { damping, friction });
        self
    }

    pub fn mimic(mut self, mimic: JointMimic) -> Self {
        self.joint.mimic = Some(mimic);
        self
    }

    pub fn build(self) -> Joint {
        self.joint
    }
}
