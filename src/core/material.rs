use std::sync::Arc;

use crate::{
    core::color::Color,
    texture::{Texture, TextureT},
};

/// glTF metallic-roughness material. Texture samples multiply the scalar factors.
pub struct Material {
    pub albedo_factor: Color,
    pub opacity_factor: f32,
    pub roughness_factor: f32,
    pub metallic_factor: f32,
    pub emissive_factor: Color,
    pub ior: f32,
    pub shadow_catcher: bool,

    pub normal_tex: Option<Arc<Texture>>,
    pub albedo_tex: Option<Arc<Texture>>,
    pub opacity_tex: Option<Arc<Texture>>,
    pub occlusion_tex: Option<Arc<Texture>>,
    /// Reads channel G.
    pub roughness_tex: Option<Arc<Texture>>,
    /// Reads channel B.
    pub metallic_tex: Option<Arc<Texture>>,
    pub emissive_tex: Option<Arc<Texture>>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo_factor: Color::WHITE,
            opacity_factor: 1.0,
            roughness_factor: 1.0,
            metallic_factor: 1.0,
            emissive_factor: Color::WHITE,
            ior: 1.33,
            shadow_catcher: false,
            normal_tex: None,
            albedo_tex: None,
            opacity_tex: None,
            occlusion_tex: None,
            roughness_tex: None,
            metallic_tex: None,
            emissive_tex: None,
        }
    }
}

fn sample(tex: &Option<Arc<Texture>>, uv: glam::Vec2) -> Option<glam::Vec4> {
    tex.as_ref().map(|tex| tex.sample(uv))
}

fn rgb(value: glam::Vec4) -> Color {
    Color::new(value.x, value.y, value.z)
}

impl Material {
    /// Tangent-space normal, `+Z` when there is no normal map.
    pub fn normal(&self, uv: glam::Vec2) -> glam::Vec3A {
        match sample(&self.normal_tex, uv) {
            Some(value) => glam::Vec3A::new(value.x, value.y, value.z) * 2.0 - glam::Vec3A::ONE,
            None => glam::Vec3A::Z,
        }
    }

    pub fn albedo(&self, uv: glam::Vec2) -> Color {
        match sample(&self.albedo_tex, uv) {
            Some(value) => self.albedo_factor * rgb(value),
            None => self.albedo_factor,
        }
    }

    pub fn opacity(&self, uv: glam::Vec2) -> f32 {
        match sample(&self.opacity_tex, uv) {
            Some(value) => self.opacity_factor * value.w,
            None => self.opacity_factor,
        }
    }

    pub fn occlusion(&self, uv: glam::Vec2) -> f32 {
        sample(&self.occlusion_tex, uv).map_or(1.0, |value| value.x)
    }

    pub fn roughness(&self, uv: glam::Vec2) -> f32 {
        match sample(&self.roughness_tex, uv) {
            Some(value) => self.roughness_factor * value.y,
            None => self.roughness_factor,
        }
    }

    pub fn metallic(&self, uv: glam::Vec2) -> f32 {
        match sample(&self.metallic_tex, uv) {
            Some(value) => self.metallic_factor * value.z,
            None => self.metallic_factor,
        }
    }

    pub fn emissive(&self, uv: glam::Vec2) -> Color {
        match sample(&self.emissive_tex, uv) {
            Some(value) => self.emissive_factor * rgb(value),
            None => self.emissive_factor,
        }
    }
}

/// A material whose name contains both "shadow" and "catcher" renders as a shadow catcher.
pub fn is_shadow_catcher_name(name: &str) -> bool {
    name.contains("shadow") && name.contains("catcher")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::ScalarTex;

    #[test]
    fn test_factors_without_textures() {
        let mat = Material {
            albedo_factor: Color::new(0.5, 0.25, 1.0),
            roughness_factor: 0.3,
            ..Default::default()
        };
        let uv = glam::Vec2::new(0.1, 0.9);
        assert_eq!(mat.albedo(uv), Color::new(0.5, 0.25, 1.0));
        assert_eq!(mat.roughness(uv), 0.3);
        assert_eq!(mat.occlusion(uv), 1.0);
        assert_eq!(mat.normal(uv), glam::Vec3A::Z);
    }

    #[test]
    fn test_combined_texture_channels() {
        let tex: Arc<Texture> = Arc::new(ScalarTex::new(glam::Vec4::new(0.9, 0.5, 0.25, 0.4)).into());
        let mat = Material {
            roughness_factor: 0.5,
            metallic_factor: 1.0,
            opacity_factor: 0.5,
            roughness_tex: Some(tex.clone()),
            metallic_tex: Some(tex.clone()),
            opacity_tex: Some(tex),
            ..Default::default()
        };
        let uv = glam::Vec2::ZERO;
        assert!((mat.roughness(uv) - 0.25).abs() < 1e-6);
        assert!((mat.metallic(uv) - 0.25).abs() < 1e-6);
        assert!((mat.opacity(uv) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_normal_map_decodes_to_signed_range() {
        let tex: Arc<Texture> = Arc::new(ScalarTex::new(glam::Vec4::new(0.5, 0.5, 1.0, 1.0)).into());
        let mat = Material {
            normal_tex: Some(tex),
            ..Default::default()
        };
        assert!((mat.normal(glam::Vec2::ZERO) - glam::Vec3A::Z).length() < 1e-6);
    }

    #[test]
    fn test_shadow_catcher_name_is_case_sensitive() {
        assert!(is_shadow_catcher_name("ground_shadow_catcher"));
        assert!(is_shadow_catcher_name("catcher of shadow"));
        assert!(!is_shadow_catcher_name("Shadow Catcher"));
        assert!(!is_shadow_catcher_name("shadow"));
    }
}
