//! Mesh decoding: raw file bytes into [`MeshData`]

mod collada;
mod gltf;
mod obj;
mod stl;

pub use collada::ColladaDecoder;
pub use gltf::GltfDecoder;
pub use obj::ObjDecoder;
pub use stl::StlDecoder;

use rovi_model::MeshData;

use crate::error::{AssetError, AssetResult};
use crate::resolver::basename;

/// Decoder for one mesh file format.
pub trait MeshDecoder: Send + Sync {
    /// Lower-case file extensions this decoder claims.
    fn extensions(&self) -> &[&str];

    fn decode(&self, bytes: &[u8], name: &str) -> AssetResult<MeshData>;
}

/// Dispatches mesh bytes to a decoder by file extension.
///
/// A registry is constructed explicitly per session and passed by
/// reference to the format adapters; nothing here is process-global, so
/// embedders can swap decoders without affecting other sessions.
pub struct MeshDecoderRegistry {
    decoders: Vec<Box<dyn MeshDecoder>>,
}

impl MeshDecoderRegistry {
    pub fn empty() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Registry with the stock decoders: STL, OBJ, COLLADA, and glTF/GLB.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(StlDecoder));
        registry.register(Box::new(ObjDecoder));
        registry.register(Box::new(ColladaDecoder));
        registry.register(Box::new(GltfDecoder));
        registry
    }

    pub fn register(&mut self, decoder: Box<dyn MeshDecoder>) {
        self.decoders.push(decoder);
    }

    pub fn supports(&self, path: &str) -> bool {
        extension_of(path).is_some_and(|ext| self.find(&ext).is_some())
    }

    /// Decode `bytes` using the decoder registered for the path's
    /// extension. Output always carries per-vertex normals; decoders that
    /// produce none (or a mismatched count) get them recomputed here.
    pub fn decode(&self, path: &str, bytes: &[u8]) -> AssetResult<MeshData> {
        let ext = extension_of(path)
            .ok_or_else(|| AssetError::UnsupportedFormat(path.to_string()))?;
        let decoder = self
            .find(&ext)
            .ok_or_else(|| AssetError::UnsupportedFormat(path.to_string()))?;
        let mut mesh = decoder.decode(bytes, basename(path))?;
        if mesh.normals.len() != mesh.vertices.len() {
            mesh.compute_normals();
        }
        Ok(mesh)
    }

    fn find(&self, ext: &str) -> Option<&dyn MeshDecoder> {
        self.decoders
            .iter()
            .find(|d| d.extensions().contains(&ext))
            .map(Box::as_ref)
    }
}

impl Default for MeshDecoderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

fn extension_of(path: &str) -> Option<String> {
    basename(path)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_dispatch() {
        let registry = MeshDecoderRegistry::builtin();
        assert!(registry.supports("meshes/arm.STL"));
        assert!(registry.supports("a.glb"));
        assert!(registry.supports("a.dae"));
        assert!(!registry.supports("a.step"));
        assert!(!registry.supports("noext"));
    }

    #[test]
    fn test_unknown_extension_errors() {
        let registry = MeshDecoderRegistry::builtin();
        let err = registry.decode("part.step", b"junk").unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_empty_registry_supports_nothing() {
        let registry = MeshDecoderRegistry::empty();
        assert!(!registry.supports("a.stl"));
    }
}
