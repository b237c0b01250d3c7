//! Wavefront OBJ mesh decoding

use std::io::Cursor;

use rovi_model::MeshData;

use crate::decode::MeshDecoder;
use crate::error::{AssetError, AssetResult};

/// Decoder for OBJ geometry. Material libraries are ignored; colors come
/// from the owning document, not the mesh file.
pub struct ObjDecoder;

impl MeshDecoder for ObjDecoder {
    fn extensions(&self) -> &[&str] {
        &["obj"]
    }

    fn decode(&self, bytes: &[u8], name: &str) -> AssetResult<MeshData> {
        let mut reader = Cursor::new(bytes);
        let (models, _materials) = tobj::load_obj_buf(
            &mut reader,
            &tobj::LoadOptions {
                triangulate: true,
                single_index: true,
                ..Default::default()
            },
            |_mtl_path| Ok((Vec::new(), Default::default())),
        )
        .map_err(|e| AssetError::decode(name, e))?;

        let mut mesh = MeshData::named(name);
        let mut all_have_normals = true;
        for model in &models {
            let base = mesh.vertices.len() as u32;
            let m = &model.mesh;
            for p in m.positions.chunks_exact(3) {
                mesh.vertices.push([p[0], p[1], p[2]]);
            }
            if m.normals.len() == m.positions.len() {
                for n in m.normals.chunks_exact(3) {
                    mesh.normals.push([n[0], n[1], n[2]]);
                }
            } else {
                all_have_normals = false;
            }
            mesh.indices.extend(m.indices.iter().map(|&i| base + i));
        }
        if !all_have_normals {
            // Mixed or absent normals; drop what we have and let the
            // registry recompute a consistent set.
            mesh.normals.clear();
        }
        if mesh.is_empty() {
            return Err(AssetError::decode(name, "no geometry in OBJ"));
        }
        Ok(mesh)
    }
}
