use crate::core::coord::cone_sample;

use super::{BxdfInputs, BxdfT};

/// Cosine-weighted diffuse lobe.
pub struct Lambert;

impl BxdfT for Lambert {
    fn sample(&self, inputs: &BxdfInputs, rand: (f32, f32)) -> glam::Vec3A {
        let theta = (2.0 * rand.0 - 1.0).acos() * 0.5;
        cone_sample(rand.1, theta.cos(), inputs.normal)
    }

    fn pdf(&self, inputs: &BxdfInputs, wi: glam::Vec3A) -> f32 {
        inputs.normal.dot(wi) * std::f32::consts::FRAC_1_PI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::Rng;

    #[test]
    fn test_samples_stay_in_upper_hemisphere() {
        let mut rng = Rng::with_seed(5);
        let inputs = BxdfInputs {
            normal: glam::Vec3A::new(0.0, 1.0, 0.0),
            wo: glam::Vec3A::new(0.0, 1.0, 0.0),
        };
        for _ in 0..512 {
            let wi = Lambert.sample(&inputs, rng.uniform_2d());
            assert!(wi.dot(inputs.normal) >= -1e-5);
            assert!(Lambert.pdf(&inputs, wi) >= -1e-5);
        }
    }

    #[test]
    fn test_pdf_is_cosine_over_pi() {
        let inputs = BxdfInputs {
            normal: glam::Vec3A::Z,
            wo: glam::Vec3A::Z,
        };
        let pdf = Lambert.pdf(&inputs, glam::Vec3A::Z);
        assert!((pdf - std::f32::consts::FRAC_1_PI).abs() < 1e-6);
    }
}
