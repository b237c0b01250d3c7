//! Core data structures for robot description viewing
//!
//! This crate contains the format-agnostic robot model shared by every
//! format adapter:
//! - `UnifiedRobotModel`: links, joints, materials, constraints
//! - `GeometryType` / `MeshData`: geometry descriptors and decoded buffers
//! - `RenderHandle` / `EventSink`: seams toward the embedding application

pub mod constraint;
pub mod geometry;
pub mod inertia;
pub mod joint;
pub mod link;
pub mod material;
pub mod mesh;
pub mod model;
pub mod origin;
pub mod render;

pub use constraint::*;
pub use geometry::*;
pub use inertia::*;
pub use joint::*;
pub use link::*;
pub use material::*;
pub use mesh::*;
pub use model::*;
pub use origin::*;
pub use render::*;
