use std::sync::Arc;

use crate::{
    core::color::Color,
    texture::{Texture, TextureT},
};

/// Radiance for rays that leave the scene: an optional equirectangular map times a factor.
pub struct EnvLight {
    texture: Option<Arc<Texture>>,
    factor: Color,
}

impl EnvLight {
    pub fn new(texture: Option<Arc<Texture>>, factor: Color) -> Self {
        Self { texture, factor }
    }

    pub fn uniform(factor: Color) -> Self {
        Self::new(None, factor)
    }

    pub fn radiance(&self, dir: glam::Vec3A) -> Color {
        match &self.texture {
            Some(tex) => {
                let value = tex.sample(equirectangular(dir));
                Color::new(value.x, value.y, value.z) * self.factor
            }
            None => self.factor,
        }
    }
}

/// `u = atan2(z, x) / 2pi + 0.5`, `v = asin(y) / pi + 0.5`.
pub fn equirectangular(dir: glam::Vec3A) -> glam::Vec2 {
    let u = dir.z.atan2(dir.x) * 0.5 * std::f32::consts::FRAC_1_PI + 0.5;
    let v = dir.y.clamp(-1.0, 1.0).asin() * std::f32::consts::FRAC_1_PI + 0.5;
    glam::Vec2::new(u, v)
}
