//! glTF and GLB mesh decoding

use rovi_model::MeshData;
use tracing::warn;

use crate::decode::MeshDecoder;
use crate::error::{AssetError, AssetResult};

/// Decoder for glTF 2.0, text and binary containers.
///
/// All mesh primitives in the document are flattened into one buffer;
/// node transforms are not applied. The first primitive's base color is
/// kept as the mesh color hint.
pub struct GltfDecoder;

impl MeshDecoder for GltfDecoder {
    fn extensions(&self) -> &[&str] {
        &["gltf", "glb"]
    }

    fn decode(&self, bytes: &[u8], name: &str) -> AssetResult<MeshData> {
        let (document, buffers, _images) =
            gltf::import_slice(bytes).map_err(|e| AssetError::decode(name, e))?;

        let mut mesh = MeshData::named(name);
        for gltf_mesh in document.meshes() {
            for primitive in gltf_mesh.primitives() {
                if primitive.mode() != gltf::mesh::Mode::Triangles {
                    warn!(
                        mesh = gltf_mesh.index(),
                        mode = ?primitive.mode(),
                        "skipping non-triangle primitive"
                    );
                    continue;
                }
                let reader = primitive.reader(|buffer| {
                    buffers.get(buffer.index()).map(|data| &data[..])
                });
                let Some(positions) = reader.read_positions() else {
                    continue;
                };
                let base = mesh.vertices.len() as u32;
                mesh.vertices.extend(positions);
                let added = mesh.vertices.len() as u32 - base;
                if let Some(normals) = reader.read_normals() {
                    mesh.normals.extend(normals);
                }
                match reader.read_indices() {
                    Some(indices) => {
                        mesh.indices.extend(indices.into_u32().map(|i| base + i));
                    }
                    None => mesh.indices.extend(base..base + added),
                }
                if mesh.color.is_none() {
                    let factor = primitive
                        .material()
                        .pbr_metallic_roughness()
                        .base_color_factor();
                    if factor != [1.0, 1.0, 1.0, 1.0] {
                        mesh.color = Some(factor);
                    }
                }
            }
        }

        if mesh.is_empty() {
            return Err(AssetError::decode(name, "no triangle geometry in glTF"));
        }
        if mesh.normals.len() != mesh.vertices.len() {
            // Some primitives carried normals and some did not; rebuild a
            // consistent set.
            mesh.compute_normals();
        }
        Ok(mesh)
    }
}
