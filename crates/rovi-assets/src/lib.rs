//! File bundle, asset resolution, and mesh decoding
//!
//! Robot descriptions arrive as a bag of user-supplied files with no real
//! filesystem behind them. This crate holds that bag ([`FileBundle`]),
//! resolves the path-like references documents make into it
//! ([`resolver`]), and decodes the mesh files they point at
//! ([`MeshDecoderRegistry`]).

pub mod bundle;
pub mod decode;
pub mod error;
pub mod resolver;

pub use bundle::*;
pub use decode::*;
pub use error::*;
pub use resolver::*;
