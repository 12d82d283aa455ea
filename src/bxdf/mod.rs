mod fresnel;
mod lambert;
mod microfacet;

pub use fresnel::*;
pub use lambert::*;
pub use microfacet::*;

use crate::core::color::Color;

/// Roughness below this shows precision artifacts in the GGX terms.
pub const MIN_ROUGHNESS: f32 = 0.05;

/// Shading frame for one lobe query: world-space normal and outgoing direction.
#[derive(Copy, Clone, Debug)]
pub struct BxdfInputs {
    pub normal: glam::Vec3A,
    pub wo: glam::Vec3A,
}

#[enum_dispatch::enum_dispatch(Bxdf)]
pub trait BxdfT {
    /// Importance-sampled incoming direction. May fall below the surface.
    fn sample(&self, inputs: &BxdfInputs, rand: (f32, f32)) -> glam::Vec3A;

    fn pdf(&self, inputs: &BxdfInputs, wi: glam::Vec3A) -> f32;
}

#[enum_dispatch::enum_dispatch]
pub enum Bxdf {
    Lambert,
    GgxSpecular,
}

/// Diffuse plus GGX specular surface, blended by fresnel and metallic.
#[derive(Copy, Clone, Debug)]
pub struct PbrSurface {
    pub albedo: Color,
    pub roughness: f32,
    pub metallic: f32,
    pub ior: f32,
}

#[derive(Copy, Clone, Debug)]
pub struct BrdfEval {
    /// Includes the cosine term.
    pub brdf: Color,
    pub diffuse_pdf: f32,
    pub specular_pdf: f32,
}

impl BrdfEval {
    /// Pdf of the lobe mixture when specular is picked with `specular_probability`.
    pub fn pdf(&self, specular_probability: f32) -> f32 {
        self.diffuse_pdf + (self.specular_pdf - self.diffuse_pdf) * specular_probability
    }
}

impl PbrSurface {
    pub fn new(albedo: Color, roughness: f32, metallic: f32, ior: f32) -> Self {
        Self {
            albedo,
            roughness: roughness.max(MIN_ROUGHNESS),
            metallic,
            ior,
        }
    }

    pub fn specular_probability(&self, inputs: &BxdfInputs) -> f32 {
        let mirror = reflect(-inputs.wo, inputs.normal);
        fresnel_schlick(inputs.wo, mirror, self.ior).max(self.metallic)
    }

    pub fn lobe(&self, specular: bool) -> Bxdf {
        if specular {
            GgxSpecular::new(self.roughness).into()
        } else {
            Lambert.into()
        }
    }

    pub fn eval(&self, inputs: &BxdfInputs, wi: glam::Vec3A) -> BrdfEval {
        let diffuse_pdf = Lambert.pdf(inputs, wi);
        let specular_pdf = GgxSpecular::new(self.roughness).pdf(inputs, wi);

        let f0 = Color::gray(0.04).lerp(self.albedo, Color::gray(self.metallic));
        let fresnel = fresnel_schlick_color(f0, inputs.wo, wi);

        let diffuse = (self.albedo * diffuse_pdf) * (1.0 - self.metallic);
        let specular = Color::gray(specular_pdf);

        BrdfEval {
            brdf: diffuse.lerp(specular, fresnel),
            diffuse_pdf,
            specular_pdf,
        }
    }
}
