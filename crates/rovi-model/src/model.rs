//! Format-agnostic robot model aggregating links, joints, materials, and
//! constraints

use std::collections::{HashMap, HashSet};

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::constraint::Constraint;
use crate::joint::{Joint, JointType, compute_joint_transform};
use crate::link::Link;
use crate::material::Material;
use crate::render::RenderHandle;

/// The unified model every format adapter produces.
///
/// Entities are keyed by their unique names. The joint graph is expected to
/// be a tree rooted at `root_link`; [`UnifiedRobotModel::validate`] reports
/// violations, construction does not enforce them beyond reference checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnifiedRobotModel {
    pub name: String,
    pub links: HashMap<String, Link>,
    pub joints: HashMap<String, Joint>,
    pub materials: HashMap<String, Material>,
    pub constraints: HashMap<String, Constraint>,
    /// Name of the unique link that is no joint's child.
    pub root_link: Option<String>,
    /// Handle to the whole model's render subtree.
    #[serde(skip)]
    pub render: Option<RenderHandle>,
    /// Source-format details that have no unified representation.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl UnifiedRobotModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    // ============== Construction ==============

    /// Insert a link. Names must be unique.
    pub fn add_link(&mut self, link: Link) -> Result<(), ModelError> {
        if self.links.contains_key(&link.name) {
            return Err(ModelError::DuplicateLink(link.name));
        }
        self.links.insert(link.name.clone(), link);
        Ok(())
    }

    /// Insert a joint. Both referenced links must already exist.
    pub fn add_joint(&mut self, joint: Joint) -> Result<(), ModelError> {
        if self.joints.contains_key(&joint.name) {
            return Err(ModelError::DuplicateJoint(joint.name));
        }
        if !self.links.contains_key(&joint.parent) {
            return Err(ModelError::InvalidJointReference(
                joint.name,
                joint.parent,
            ));
        }
        if !self.links.contains_key(&joint.child) {
            return Err(ModelError::InvalidJointReference(joint.name, joint.child));
        }
        self.joints.insert(joint.name.clone(), joint);
        Ok(())
    }

    pub fn add_material(&mut self, material: Material) {
        self.materials.insert(material.name.clone(), material);
    }

    pub fn add_constraint(&mut self, constraint: Constraint) {
        self.constraints.insert(constraint.name.clone(), constraint);
    }

    // ============== Query Helpers ==============

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.get(name)
    }

    pub fn link_mut(&mut self, name: &str) -> Option<&mut Link> {
        self.links.get_mut(name)
    }

    pub fn joint(&self, name: &str) -> Option<&Joint> {
        self.joints.get(name)
    }

    pub fn joint_mut(&mut self, name: &str) -> Option<&mut Joint> {
        self.joints.get_mut(name)
    }

    pub fn material(&self, name: &str) -> Option<&Material> {
        self.materials.get(name)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Joints whose parent is the given link, sorted by joint name.
    pub fn child_joints(&self, link: &str) -> Vec<&Joint> {
        let mut joints: Vec<&Joint> = self
            .joints
            .values()
            .filter(|j| j.parent == link)
            .collect();
        joints.sort_by(|a, b| a.name.cmp(&b.name));
        joints
    }

    /// The joint whose child is the given link, if any.
    pub fn parent_joint(&self, link: &str) -> Option<&Joint> {
        self.joints.values().find(|j| j.child == link)
    }

    /// The unique link that is no joint's child, when exactly one exists.
    pub fn compute_root(&self) -> Option<String> {
        let children: HashSet<&str> = self.joints.values().map(|j| j.child.as_str()).collect();
        let mut candidates: Vec<&String> = self
            .links
            .keys()
            .filter(|name| !children.contains(name.as_str()))
            .collect();
        candidates.sort();
        match candidates.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        }
    }

    /// Link names in depth-first order from the root, children visited in
    /// joint-name order.
    pub fn links_depth_first(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.links.len());
        let Some(root) = &self.root_link else {
            return order;
        };
        let mut stack = vec![root.clone()];
        let mut seen = HashSet::new();
        while let Some(name) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            // Reverse so the first child by joint name pops first.
            for joint in self.child_joints(&name).into_iter().rev() {
                stack.push(joint.child.clone());
            }
            order.push(name);
        }
        order
    }

    // ============== Joint Values ==============

    /// Set a joint's value, clamped to its limits, and propagate the new
    /// value to joints that mimic it. Returns the value actually applied.
    /// World transforms are not recomputed; callers batch updates and call
    /// [`UnifiedRobotModel::update_world_transforms_with_values`] once.
    pub fn set_joint_value(&mut self, name: &str, value: f32) -> Result<f32, ModelError> {
        let applied = {
            let joint = self
                .joints
                .get_mut(name)
                .ok_or_else(|| ModelError::JointNotFound(name.to_string()))?;
            if joint.joint_type == JointType::Fixed {
                return Ok(0.0);
            }
            let applied = joint.clamped_value(value);
            joint.current_value = applied;
            applied
        };

        let followers: Vec<String> = self
            .joints
            .values()
            .filter(|j| j.mimic.as_ref().is_some_and(|m| m.joint == name))
            .map(|j| j.name.clone())
            .collect();
        for follower in followers {
            if let Some(joint) = self.joints.get_mut(&follower)
                && let Some(mimic) = &joint.mimic
            {
                joint.current_value = joint.clamped_value(mimic.calculate(applied));
            }
        }
        Ok(applied)
    }

    /// A joint's effective value, resolving one level of mimic coupling
    /// against the source joint's current value.
    fn effective_value(&self, joint: &Joint) -> f32 {
        match &joint.mimic {
            Some(mimic) => self
                .joints
                .get(&mimic.joint)
                .map(|source| mimic.calculate(source.current_value))
                .unwrap_or(joint.current_value),
            None => joint.current_value,
        }
    }

    // ============== Forward Kinematics ==============

    /// Recompute every link's world transform with all joints at zero.
    pub fn update_world_transforms(&mut self) {
        self.propagate_transforms(false);
    }

    /// Recompute every link's world transform at the current joint values.
    pub fn update_world_transforms_with_values(&mut self) {
        self.propagate_transforms(true);
    }

    fn propagate_transforms(&mut self, with_values: bool) {
        let Some(root) = self.root_link.clone() else {
            return;
        };
        let child_to_joint: HashMap<String, String> = self
            .joints
            .values()
            .map(|j| (j.child.clone(), j.name.clone()))
            .collect();

        let mut stack = vec![(root, Mat4::IDENTITY)];
        let mut seen = HashSet::new();
        while let Some((name, parent_tf)) = stack.pop() {
            if !seen.insert(name.clone()) {
                continue;
            }
            let tf = match child_to_joint.get(&name).and_then(|j| self.joints.get(j)) {
                Some(joint) => {
                    let value = if with_values {
                        self.effective_value(joint)
                    } else {
                        0.0
                    };
                    parent_tf
                        * joint.origin.to_mat4()
                        * compute_joint_transform(joint.joint_type, joint.axis, value)
                }
                None => parent_tf,
            };
            if let Some(link) = self.links.get_mut(&name) {
                link.world_transform = tf;
            }
            for joint in self.child_joints(&name) {
                stack.push((joint.child.clone(), tf));
            }
        }
    }

    // ============== Validation ==============

    /// Check the structural invariants: a root exists, every joint
    /// references existing links, and every link is reachable from the
    /// root.
    pub fn validate(&self) -> Result<(), Vec<ModelError>> {
        let mut errors = Vec::new();

        for joint in self.joints.values() {
            if !self.links.contains_key(&joint.parent) {
                errors.push(ModelError::InvalidJointReference(
                    joint.name.clone(),
                    joint.parent.clone(),
                ));
            }
            if !self.links.contains_key(&joint.child) {
                errors.push(ModelError::InvalidJointReference(
                    joint.name.clone(),
                    joint.child.clone(),
                ));
            }
        }

        match &self.root_link {
            None => {
                if !self.links.is_empty() {
                    errors.push(ModelError::NoRoot);
                }
            }
            Some(root) if !self.links.contains_key(root) => {
                errors.push(ModelError::RootNotFound(root.clone()));
            }
            Some(root) => {
                let reachable = self.collect_reachable(root);
                let mut orphans: Vec<&String> = self
                    .links
                    .keys()
                    .filter(|name| !reachable.contains(name.as_str()))
                    .collect();
                orphans.sort();
                for orphan in orphans {
                    errors.push(ModelError::OrphanedLink(orphan.clone()));
                }
            }
        }

        let children: HashSet<&str> = self.joints.values().map(|j| j.child.as_str()).collect();
        let mut roots: Vec<&String> = self
            .links
            .keys()
            .filter(|name| !children.contains(name.as_str()))
            .collect();
        roots.sort();
        if roots.len() > 1 {
            errors.push(ModelError::MultipleRoots(
                roots.into_iter().cloned().collect(),
            ));
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    fn collect_reachable(&self, root: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let mut stack = vec![root.to_string()];
        while let Some(name) = stack.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            for joint in self.child_joints(&name) {
                stack.push(joint.child.clone());
            }
        }
        reachable
    }
}

// ============== Errors ==============

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    #[error("Link not found: {0}")]
    LinkNotFound(String),

    #[error("Joint not found: {0}")]
    JointNotFound(String),

    #[error("Duplicate link name: {0}")]
    DuplicateLink(String),

    #[error("Duplicate joint name: {0}")]
    DuplicateJoint(String),

    #[error("Joint '{0}' references missing link '{1}'")]
    InvalidJointReference(String, String),

    #[error("Model has links but no root link")]
    NoRoot,

    #[error("Root link '{0}' does not exist")]
    RootNotFound(String),

    #[error("Multiple root candidates: {0:?}")]
    MultipleRoots(Vec<String>),

    #[error("Link '{0}' is not reachable from the root")]
    OrphanedLink(String),
}
