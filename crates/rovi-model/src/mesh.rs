//! Decoded triangle-mesh buffers

use glam::Vec3;

/// Render-ready triangle mesh produced by the asset decode layer.
///
/// Vertices and normals are parallel arrays; `indices` holds triangle
/// corners in counter-clockwise winding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    /// Flat color carried by the source file, when it declares one.
    pub color: Option<[f32; 4]>,
}

impl MeshData {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertex positions as a flat `x y z` buffer for upload.
    pub fn positions_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Vertex normals as a flat `x y z` buffer for upload.
    pub fn normals_flat(&self) -> &[f32] {
        bytemuck::cast_slice(&self.normals)
    }

    /// Scale every vertex position in place. Normals keep direction since
    /// only uniform handedness-preserving scales are expected here.
    pub fn apply_scale(&mut self, scale: Vec3) {
        if scale == Vec3::ONE {
            return;
        }
        for v in &mut self.vertices {
            v[0] *= scale.x;
            v[1] *= scale.y;
            v[2] *= scale.z;
        }
    }

    /// Axis-aligned bounds of the vertex positions.
    pub fn bounding_box(&self) -> Option<([f32; 3], [f32; 3])> {
        let mut iter = self.vertices.iter();
        let first = *iter.next()?;
        let mut min = first;
        let mut max = first;
        for v in iter {
            for axis in 0..3 {
                min[axis] = min[axis].min(v[axis]);
                max[axis] = max[axis].max(v[axis]);
            }
        }
        Some((min, max))
    }

    /// Rebuild per-vertex normals by area-weighted face accumulation.
    pub fn compute_normals(&mut self) {
        let mut accum = vec![Vec3::ZERO; self.vertices.len()];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= accum.len() || b >= accum.len() || c >= accum.len() {
                continue;
            }
            let pa = Vec3::from(self.vertices[a]);
            let pb = Vec3::from(self.vertices[b]);
            let pc = Vec3::from(self.vertices[c]);
            // Cross product length is proportional to face area.
            let face = (pb - pa).cross(pc - pa);
            accum[a] += face;
            accum[b] += face;
            accum[c] += face;
        }
        self.normals = accum
            .into_iter()
            .map(|n| n.normalize_or_zero().to_array())
            .collect();
    }
}
