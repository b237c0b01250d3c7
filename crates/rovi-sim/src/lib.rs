//! Physics simulation bridge for loaded robot models
//!
//! Mirrors a robot description into a physics engine and back:
//! - `SimBridge`: lifecycle state machine over a [`PhysicsKernel`]
//! - `Simulation` / `ModelView`: the engine surface the bridge drives
//! - `SimScene`: render mirror of the compiled model, markers included
//! - `staging`: ground-plane injection and asset layout on the engine's
//!   virtual filesystem
//! - `convert`: Z-up engine frame to Y-up render frame and back
//!
//! The engine itself stays behind the `PhysicsKernel` trait so the crate
//! works against a hosted MuJoCo build or a test double alike.

pub mod bridge;
pub mod convert;
pub mod error;
pub mod kernel;
pub mod scene;
pub mod staging;
pub mod vfs;

pub use bridge::*;
pub use error::*;
pub use kernel::*;
pub use scene::*;
pub use vfs::*;
