use crate::core::transform::Transform;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: glam::Vec3A,
    direction: glam::Vec3A,
}

impl Ray {
    /// `direction` is normalized on construction.
    pub fn new(origin: glam::Vec3A, direction: glam::Vec3A) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    pub fn direction(&self) -> glam::Vec3A {
        self.direction
    }

    /// Origin is transformed affinely, direction linearly and renormalized.
    pub fn transformed_by(&self, trans: &Transform) -> Self {
        Self::new(
            trans.transform_point(self.origin),
            trans.transform_vector(self.direction),
        )
    }
}
