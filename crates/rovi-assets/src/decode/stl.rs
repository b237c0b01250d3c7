//! STL mesh decoding

use std::collections::HashMap;
use std::io::Cursor;

use rovi_model::MeshData;

use crate::decode::MeshDecoder;
use crate::error::{AssetError, AssetResult};

/// Quantization factor for welding vertices that differ only by float
/// noise. 10000 keeps 0.1mm resolution.
const PRECISION: f32 = 10000.0;

/// Decoder for binary and ASCII STL.
pub struct StlDecoder;

impl MeshDecoder for StlDecoder {
    fn extensions(&self) -> &[&str] {
        &["stl"]
    }

    fn decode(&self, bytes: &[u8], name: &str) -> AssetResult<MeshData> {
        let mut reader = Cursor::new(bytes);
        let stl = stl_io::read_stl(&mut reader)
            .map_err(|e| AssetError::decode(name, e))?;
        Ok(index_mesh(&stl, name))
    }
}

/// Build an indexed mesh from STL soup: weld coincident vertices by
/// quantized position and accumulate face normals into per-vertex
/// normals.
fn index_mesh(stl: &stl_io::IndexedMesh, name: &str) -> MeshData {
    let mut mesh = MeshData::named(name);
    let mut vertex_map: HashMap<(i64, i64, i64), u32> = HashMap::new();

    for face in &stl.faces {
        let normal = [face.normal[0], face.normal[1], face.normal[2]];
        for &vertex_idx in &face.vertices {
            let vertex = stl.vertices[vertex_idx];
            let v = [vertex[0], vertex[1], vertex[2]];
            let key = (
                (v[0] * PRECISION).round() as i64,
                (v[1] * PRECISION).round() as i64,
                (v[2] * PRECISION).round() as i64,
            );
            let index = match vertex_map.get(&key) {
                Some(&index) => {
                    let n = &mut mesh.normals[index as usize];
                    n[0] += normal[0];
                    n[1] += normal[1];
                    n[2] += normal[2];
                    index
                }
                None => {
                    let index = mesh.vertices.len() as u32;
                    mesh.vertices.push(v);
                    mesh.normals.push(normal);
                    vertex_map.insert(key, index);
                    index
                }
            };
            mesh.indices.push(index);
        }
    }

    for n in &mut mesh.normals {
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > 1e-12 {
            n[0] /= len;
            n[1] /= len;
            n[2] /= len;
        }
    }
    mesh
}
