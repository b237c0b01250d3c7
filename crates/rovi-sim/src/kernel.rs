//! Contracts the physics engine presents to the bridge
//!
//! The real engine is an externally-hosted kernel; the bridge only ever
//! talks to it through these traits, so tests drive the full state
//! machine with a mock.

use crate::error::SimResult;
use crate::vfs::StagingFs;

/// Geometry primitive kinds, numbered as the engine's geom type array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeomKind {
    Plane = 0,
    HeightField = 1,
    Sphere = 2,
    Capsule = 3,
    Ellipsoid = 4,
    Cylinder = 5,
    Box = 6,
    Mesh = 7,
}

impl GeomKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Plane,
            1 => Self::HeightField,
            2 => Self::Sphere,
            3 => Self::Capsule,
            4 => Self::Ellipsoid,
            5 => Self::Cylinder,
            6 => Self::Box,
            7 => Self::Mesh,
            _ => return None,
        })
    }
}

/// Joint kinds, numbered as the engine's joint type array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointKind {
    Free = 0,
    Ball = 1,
    Slide = 2,
    Hinge = 3,
}

impl JointKind {
    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => Self::Free,
            1 => Self::Ball,
            2 => Self::Slide,
            3 => Self::Hinge,
            _ => return None,
        })
    }
}

/// An engine instance: staging filesystem plus a document compiler.
pub trait PhysicsKernel {
    type Sim: Simulation;

    /// Staging filesystem the compiler reads documents and assets from.
    fn fs(&mut self) -> &mut dyn StagingFs;

    /// Compile a staged document into a live simulation.
    fn compile(&mut self, document_path: &str) -> SimResult<Self::Sim>;
}

/// A compiled model plus its mutable integration state.
///
/// Positions and orientations cross this boundary in the engine's native
/// frame and layout; the bridge owns every conversion.
pub trait Simulation {
    type Model: ModelView;

    fn model(&self) -> &Self::Model;

    /// Advance one fixed timestep.
    fn step(&mut self);

    /// Restore the initial configuration with zero velocity.
    fn reset(&mut self);

    /// Zero all externally applied forces.
    fn clear_forces(&mut self);

    /// Apply a force at a world point on a body, engine frame.
    fn apply_force(&mut self, body: usize, force: [f64; 3], point: [f64; 3]);

    /// Body world position, engine frame.
    fn xpos(&self, body: usize) -> [f64; 3];

    /// Body world orientation, scalar first, engine frame.
    fn xquat(&self, body: usize) -> [f64; 4];

    /// Release engine-side resources. The bridge calls this at most once.
    fn release(&mut self);
}

/// Read-only views over the compiled model's arrays.
pub trait ModelView {
    fn nbody(&self) -> usize;
    fn ngeom(&self) -> usize;
    fn njnt(&self) -> usize;

    /// Fixed integration timestep in seconds.
    fn timestep(&self) -> f64;

    fn geom_kind(&self, geom: usize) -> GeomKind;
    /// Raw size fields; radii and half-lengths, interpreted per kind.
    fn geom_size(&self, geom: usize) -> [f64; 3];
    /// Offset within the owning body's frame.
    fn geom_pos(&self, geom: usize) -> [f64; 3];
    /// Orientation within the owning body's frame, scalar first.
    fn geom_quat(&self, geom: usize) -> [f64; 4];
    fn geom_rgba(&self, geom: usize) -> [f32; 4];
    fn geom_group(&self, geom: usize) -> i32;
    fn geom_bodyid(&self, geom: usize) -> usize;
    /// Mesh asset index for mesh geoms.
    fn geom_dataid(&self, geom: usize) -> Option<usize>;

    fn body_mass(&self, body: usize) -> f64;
    /// Principal moments of inertia.
    fn body_inertia(&self, body: usize) -> [f64; 3];
    /// Center of mass within the body frame.
    fn body_ipos(&self, body: usize) -> [f64; 3];
    /// Inertial frame orientation, scalar first.
    fn body_iquat(&self, body: usize) -> [f64; 4];
    fn body_name(&self, body: usize) -> Option<String>;

    fn jnt_kind(&self, joint: usize) -> JointKind;
    fn jnt_bodyid(&self, joint: usize) -> usize;
    fn jnt_axis(&self, joint: usize) -> [f64; 3];
    /// Joint anchor within the body frame.
    fn jnt_pos(&self, joint: usize) -> [f64; 3];

    fn mesh_vertices(&self, mesh: usize) -> Vec<[f32; 3]>;
    fn mesh_normals(&self, mesh: usize) -> Vec<[f32; 3]>;
    fn mesh_faces(&self, mesh: usize) -> Vec<u32>;
}
