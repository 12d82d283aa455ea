use crate::core::{coord::cone_sample, EPSILON};

use super::{fresnel::reflect, BxdfInputs, BxdfT};

/// GGX lobe. Roughness is perceptual; `alpha = roughness^4` inside the distribution.
pub struct GgxSpecular {
    roughness: f32,
}

impl GgxSpecular {
    pub fn new(roughness: f32) -> Self {
        Self { roughness }
    }

    fn alpha(&self) -> f32 {
        let r2 = self.roughness * self.roughness;
        r2 * r2
    }

    /// Normal distribution times `n.wi`.
    pub fn distribution(&self, n: glam::Vec3A, wo: glam::Vec3A, wi: glam::Vec3A) -> f32 {
        let alpha = self.alpha();
        let halfway = (wo + wi).normalize();
        let cos_h = n.dot(halfway);
        let denom = 1.0 + (alpha - 1.0) * cos_h * cos_h;
        let cos_i = n.dot(wi);
        cos_i * alpha / (std::f32::consts::PI * denom * denom).max(EPSILON)
    }

    /// Smith joint masking-shadowing with `k = (roughness + 1)^2 / 8`.
    pub fn geometry(&self, n: glam::Vec3A, wo: glam::Vec3A, wi: glam::Vec3A) -> f32 {
        let r = self.roughness + 1.0;
        let k = r * r / 8.0;
        smith_g1(n, wo, k) * smith_g1(n, wi, k)
    }
}

fn smith_g1(n: glam::Vec3A, w: glam::Vec3A, k: f32) -> f32 {
    let cos_theta = n.dot(w);
    cos_theta / (k + (1.0 - k) * cos_theta).max(EPSILON)
}

impl BxdfT for GgxSpecular {
    fn sample(&self, inputs: &BxdfInputs, rand: (f32, f32)) -> glam::Vec3A {
        let alpha = self.alpha();
        let cos_theta = ((1.0 - rand.0) / (1.0 + (alpha - 1.0) * rand.0)).sqrt();
        let halfway = cone_sample(rand.1, cos_theta, inputs.normal);
        reflect(-inputs.wo, halfway)
    }

    fn pdf(&self, inputs: &BxdfInputs, wi: glam::Vec3A) -> f32 {
        let n = inputs.normal;
        let wo = inputs.wo;
        let d = self.distribution(n, wo, wi);
        let g = self.geometry(n, wo, wi);
        d * g / (4.0 * n.dot(wo) * n.dot(wi)).max(EPSILON)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::Rng;

    #[test]
    fn test_smooth_surface_samples_near_mirror() {
        let mut rng = Rng::with_seed(9);
        let ggx = GgxSpecular::new(0.05);
        let wo = glam::Vec3A::new(0.6, 0.0, 0.8);
        let inputs = BxdfInputs {
            normal: glam::Vec3A::Z,
            wo,
        };
        let mirror = reflect(-wo, glam::Vec3A::Z);
        for _ in 0..128 {
            let wi = ggx.sample(&inputs, rng.uniform_2d());
            assert!(wi.dot(mirror) > 0.99);
        }
    }

    #[test]
    fn test_pdf_is_finite_and_non_negative() {
        let mut rng = Rng::with_seed(10);
        for _ in 0..256 {
            let roughness = rng.uniform_range(0.05, 1.0);
            let ggx = GgxSpecular::new(roughness);
            let wo = (glam::Vec3A::Z + rng.uniform_on_sphere() * 0.9).normalize();
            if wo.z <= 0.0 {
                continue;
            }
            let inputs = BxdfInputs {
                normal: glam::Vec3A::Z,
                wo,
            };
            let wi = ggx.sample(&inputs, rng.uniform_2d());
            if wi.z <= 0.0 {
                continue;
            }
            let pdf = ggx.pdf(&inputs, wi);
            assert!(pdf.is_finite());
            assert!(pdf >= 0.0);
        }
    }
}
