/// Orthonormal frame whose local +Z maps onto a chosen world direction.
#[derive(Copy, Clone, Debug)]
pub struct Coordinate {
    local_to_world: glam::Mat3A,
}

impl Coordinate {
    /// Frame around `n` built from the least aligned world axis.
    pub fn from_z(n: glam::Vec3A) -> Self {
        let inv_sqrt3 = 1.0 / 3.0f32.sqrt();
        let non_parallel = if n.x.abs() < inv_sqrt3 {
            glam::Vec3A::X
        } else if n.y.abs() < inv_sqrt3 {
            glam::Vec3A::Y
        } else {
            glam::Vec3A::Z
        };

        let tangent = n.cross(non_parallel).normalize();
        let binormal = n.cross(tangent);
        Self {
            local_to_world: glam::Mat3A::from_cols(tangent, binormal, n),
        }
    }

    /// Tangent space for normal mapping: columns are `(t, n x t, n)`.
    pub fn from_tangent_normal(t: glam::Vec3A, n: glam::Vec3A) -> Self {
        Self {
            local_to_world: glam::Mat3A::from_cols(t, n.cross(t), n),
        }
    }

    pub fn to_world(&self, local: glam::Vec3A) -> glam::Vec3A {
        self.local_to_world * local
    }
}

/// Random direction inside the cone of half-angle `acos(cos_theta)` around `n`.
pub fn cone_sample(rand: f32, cos_theta: f32, n: glam::Vec3A) -> glam::Vec3A {
    let phi = rand * 2.0 * std::f32::consts::PI;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let local = glam::Vec3A::new(cos_phi * sin_theta, sin_phi * sin_theta, cos_theta);
    Coordinate::from_z(n).to_world(local)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::Rng;

    #[test]
    fn test_frame_is_orthonormal() {
        let mut rng = Rng::with_seed(7);
        for _ in 0..64 {
            let n = rng.uniform_on_sphere();
            let coord = Coordinate::from_z(n);
            let x = coord.to_world(glam::Vec3A::X);
            let y = coord.to_world(glam::Vec3A::Y);
            let z = coord.to_world(glam::Vec3A::Z);
            assert!((x.length() - 1.0).abs() < 1e-4);
            assert!((y.length() - 1.0).abs() < 1e-4);
            assert!(x.dot(y).abs() < 1e-4 && x.dot(z).abs() < 1e-4);
            assert!((z - n).length() < 1e-5);
        }
    }

    #[test]
    fn test_cone_sample_stays_in_cone() {
        let mut rng = Rng::with_seed(11);
        let n = glam::Vec3A::new(0.3, 0.8, -0.2).normalize();
        let cos_theta = 0.9;
        for _ in 0..256 {
            let dir = cone_sample(rng.uniform_1d(), cos_theta, n);
            assert!((dir.length() - 1.0).abs() < 1e-4);
            assert!((dir.dot(n) - cos_theta).abs() < 1e-4);
        }
    }
}
