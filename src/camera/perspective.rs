use crate::core::{ray::Ray, transform::Transform};

use super::CameraT;

/// Pinhole camera looking down its local `-Z`.
#[derive(Copy, Clone, Debug)]
pub struct PerspectiveCamera {
    fov: f32,
    tan_half_fov: f32,
}

impl PerspectiveCamera {
    /// `fov` is the vertical field of view in radians.
    pub fn new(fov: f32) -> Self {
        Self {
            fov,
            tan_half_fov: (fov * 0.5).tan(),
        }
    }

    pub fn fov(&self) -> f32 {
        self.fov
    }
}

impl CameraT for PerspectiveCamera {
    fn generate_ray(&self, ndc: glam::Vec2, aspect: f32, world: &Transform) -> Ray {
        let dir = ndc * self.tan_half_fov;
        let local = Ray::new(glam::Vec3A::ZERO, glam::Vec3A::new(dir.x * aspect, dir.y, -1.0));
        local.transformed_by(world)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_center_ray_follows_camera_forward() {
        let cam = PerspectiveCamera::new(std::f32::consts::FRAC_PI_2);
        let world = Transform::from_trs(
            glam::Vec3A::new(0.0, 1.0, 5.0),
            glam::Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            glam::Vec3A::ONE,
        );
        let ray = cam.generate_ray(glam::Vec2::ZERO, 1.0, &world);
        assert!((ray.origin - glam::Vec3A::new(0.0, 1.0, 5.0)).length() < 1e-5);
        assert!((ray.direction() - glam::Vec3A::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_corner_ray_spans_half_fov() {
        let cam = PerspectiveCamera::new(std::f32::consts::FRAC_PI_2);
        let ray = cam.generate_ray(glam::Vec2::new(0.0, 1.0), 1.0, &Transform::IDENTITY);
        let angle = ray.direction().dot(-glam::Vec3A::Z).acos();
        assert!((angle - std::f32::consts::FRAC_PI_4).abs() < 1e-5);
    }
}
