//! Coordinate conversion between the engine and render frames
//!
//! The engine simulates in a Z-up right-handed frame with scalar-first
//! quaternions; the render layer draws Y-up with vector-first
//! quaternions. Geometry buffers are permuted once at construction, body
//! poses every frame, and both must go through these exact functions or
//! instanced meshes drift against their bodies.

use glam::{DQuat, DVec3};

/// Engine position or vector into the render frame.
pub fn pos_to_render(p: [f64; 3]) -> DVec3 {
    DVec3::new(p[0], p[2], -p[1])
}

/// Render position or vector into the engine frame.
pub fn pos_to_engine(p: DVec3) -> [f64; 3] {
    [p.x, -p.z, p.y]
}

/// Engine orientation (scalar first) into the render frame.
pub fn quat_to_render(q: [f64; 4]) -> DQuat {
    DQuat::from_xyzw(-q[1], -q[3], q[2], -q[0])
}

/// Render orientation back into the engine's scalar-first layout.
pub fn quat_to_engine(q: DQuat) -> [f64; 4] {
    [-q.w, -q.x, q.z, -q.y]
}

/// Bake the axis permutation into a mesh vertex or normal buffer.
pub fn permute_mesh_buffer(buffer: &mut [[f32; 3]]) {
    for v in buffer.iter_mut() {
        *v = [v[0], v[2], -v[1]];
    }
}
