use crate::core::{color::Color, coord::cone_sample, rng::Rng, transform::Transform};

/// Distant disc light. It shines along the entity's local `-Z`, so samples point
/// toward the sun along local `+Z`.
#[derive(Copy, Clone, Debug)]
pub struct SunLight {
    pub energy: Color,
    /// Radians.
    pub angular_radius: f32,
}

impl Default for SunLight {
    fn default() -> Self {
        Self {
            energy: Color::new(1.0, 0.6, 0.2) * 50.0,
            angular_radius: 0.004732,
        }
    }
}

impl SunLight {
    pub fn new(energy: Color) -> Self {
        Self {
            energy,
            ..Default::default()
        }
    }

    /// Unit vector from a surface toward the sun's center.
    pub fn direction(&self, world: &Transform) -> glam::Vec3A {
        world.transform_vector(glam::Vec3A::Z).normalize()
    }

    /// Direction toward a random point of the sun disc.
    pub fn sample_direction(&self, world: &Transform, rng: &mut Rng) -> glam::Vec3A {
        let (rand_phi, rand_theta) = rng.uniform_2d();
        let cos_theta = (rand_theta * self.angular_radius).cos();
        cone_sample(rand_phi, cos_theta, self.direction(world))
    }
}
