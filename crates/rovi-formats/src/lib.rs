//! Format adapters from robot description dialects to the unified model
//!
//! Each adapter turns one source dialect plus its file bundle into a
//! [`rovi_model::UnifiedRobotModel`]:
//! - `urdf` / `xacro`: the ROS description stack, macro expansion included
//! - `mjcf`: MuJoCo scene XML, equality constraints included
//! - `usd`: usda text stages and usdz archives
//!
//! The `loader` module detects which dialect a document speaks and runs
//! the matching adapter behind a single-flight guard.

pub mod error;
pub mod loader;
pub mod mjcf;
pub mod urdf;
pub mod usd;
pub mod xacro;
pub mod xml;

pub use error::*;
pub use loader::*;
