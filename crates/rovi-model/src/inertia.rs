//! Inertia tensor representation and derived quantities

use serde::{Deserialize, Serialize};

/// Rotational inertia about the element's own frame, in kg m^2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InertiaTensor {
    pub ixx: f32,
    pub iyy: f32,
    pub izz: f32,
    pub ixy: f32,
    pub ixz: f32,
    pub iyz: f32,
}

impl InertiaTensor {
    pub fn from_diagonal(ixx: f32, iyy: f32, izz: f32) -> Self {
        Self {
            ixx,
            iyy,
            izz,
            ..Default::default()
        }
    }

    /// Inertia of a solid box with the given full extents and mass.
    pub fn from_box(mass: f32, size: [f32; 3]) -> Self {
        let [x, y, z] = size;
        let k = mass / 12.0;
        Self::from_diagonal(k * (y * y + z * z), k * (x * x + z * z), k * (x * x + y * y))
    }

    /// Inertia of a solid box spanning the given bounds, mass distributed
    /// uniformly.
    pub fn from_bounding_box(mass: f32, min: [f32; 3], max: [f32; 3]) -> Self {
        Self::from_box(
            mass,
            [max[0] - min[0], max[1] - min[1], max[2] - min[2]],
        )
    }

    /// Diagonal of the tensor, read as principal moments.
    pub fn principal_moments(&self) -> [f32; 3] {
        [self.ixx, self.iyy, self.izz]
    }

    pub fn is_diagonal(&self) -> bool {
        self.ixy == 0.0 && self.ixz == 0.0 && self.iyz == 0.0
    }

    /// Half extents of the uniform box with the same mass and principal
    /// moments. Degenerate moment combinations clamp to zero instead of
    /// producing NaN.
    pub fn equivalent_box_half_extents(&self, mass: f32) -> [f32; 3] {
        if mass <= 0.0 {
            return [0.0; 3];
        }
        let p = self.principal_moments();
        let half = |i: usize, j: usize, k: usize| {
            (6.0 * (p[j] + p[k] - p[i]) / mass).max(0.0).sqrt() / 2.0
        };
        [half(0, 1, 2), half(1, 0, 2), half(2, 0, 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_box_inertia_round_trips_through_half_extents() {
        let size = [0.2, 0.4, 0.6];
        let mass = 12.0;
        let tensor = InertiaTensor::from_box(mass, size);
        let halves = tensor.equivalent_box_half_extents(mass);
        assert_relative_eq!(halves[0], 0.1, epsilon = 1e-5);
        assert_relative_eq!(halves[1], 0.2, epsilon = 1e-5);
        assert_relative_eq!(halves[2], 0.3, epsilon = 1e-5);
    }

    #[test]
    fn test_degenerate_moments_clamp() {
        // Ixx larger than the other two combined would put a negative
        // value under the square root.
        let tensor = InertiaTensor::from_diagonal(10.0, 1.0, 1.0);
        let halves = tensor.equivalent_box_half_extents(1.0);
        assert_eq!(halves[0], 0.0);
        assert!(halves[1] > 0.0);
        assert!(halves[2] > 0.0);
    }

    #[test]
    fn test_zero_mass_yields_zero_box() {
        let tensor = InertiaTensor::from_diagonal(1.0, 1.0, 1.0);
        assert_eq!(tensor.equivalent_box_half_extents(0.0), [0.0; 3]);
    }

    #[test]
    fn test_bounding_box_matches_box() {
        let a = InertiaTensor::from_box(2.0, [1.0, 2.0, 3.0]);
        let b = InertiaTensor::from_bounding_box(2.0, [-0.5, -1.0, -1.5], [0.5, 1.0, 1.5]);
        assert_relative_eq!(a.ixx, b.ixx);
        assert_relative_eq!(a.iyy, b.iyy);
        assert_relative_eq!(a.izz, b.izz);
    }
}
