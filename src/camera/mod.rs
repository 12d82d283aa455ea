mod perspective;

pub use perspective::*;

use crate::core::{ray::Ray, transform::Transform};

#[enum_dispatch::enum_dispatch(Camera)]
pub trait CameraT: Send + Sync {
    /// World-space ray through `ndc` in `[-1, 1]^2`, `y` pointing up.
    fn generate_ray(&self, ndc: glam::Vec2, aspect: f32, world: &Transform) -> Ray;
}

#[enum_dispatch::enum_dispatch]
pub enum Camera {
    PerspectiveCamera,
}

/// Normalized device coordinates of a point inside pixel `(x, y)`, rows counted from the top.
pub fn pixel_to_ndc(x: u32, y: u32, offset: (f32, f32), width: u32, height: u32) -> glam::Vec2 {
    let u = (x as f32 + offset.0) / width as f32 * 2.0 - 1.0;
    let v = (y as f32 + offset.1) / height as f32 * 2.0 - 1.0;
    glam::Vec2::new(u, -v)
}
