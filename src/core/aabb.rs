use crate::core::ray::Ray;

/// Axis-aligned box. `min > max` on any axis is the empty box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: glam::Vec3A,
    pub max: glam::Vec3A,
}

/// Entry and exit distances along a ray.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AabbHit {
    pub near: f32,
    pub far: f32,
}

impl AabbHit {
    /// A negative `far` means the whole box lies behind the ray.
    pub fn has_hit(&self) -> bool {
        self.far >= 0.0
    }
}

impl Aabb {
    pub fn new(min: glam::Vec3A, max: glam::Vec3A) -> Self {
        Self { min, max }
    }

    pub fn empty() -> Self {
        Self {
            min: glam::Vec3A::splat(f32::MAX),
            max: glam::Vec3A::splat(f32::MIN),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    pub fn add_point(&mut self, point: glam::Vec3A) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    pub fn add_aabb(&mut self, other: &Aabb) {
        if !other.is_empty() {
            self.add_point(other.min);
            self.add_point(other.max);
        }
    }

    pub fn expanded(mut self, amount: f32) -> Self {
        self.min -= glam::Vec3A::splat(amount);
        self.max += glam::Vec3A::splat(amount);
        self
    }

    pub fn extent(&self) -> glam::Vec3A {
        self.max - self.min
    }

    pub fn surface_area(&self) -> f32 {
        let d = self.extent();
        2.0 * (d.x * d.y + d.y * d.z + d.x * d.z)
    }

    /// Splits along `axis` at `split`; the left half keeps the smaller coordinates.
    pub fn split(&self, axis: usize, split: f32) -> (Aabb, Aabb) {
        let mut left = *self;
        let mut right = *self;
        left.max[axis] = split;
        right.min[axis] = split;
        (left, right)
    }

    /// Slab test. `near` is negative when the origin is inside the box.
    pub fn intersect(&self, ray: &Ray) -> Option<AabbHit> {
        if self.is_empty() {
            return None;
        }

        let inv_dir = glam::Vec3A::ONE / ray.direction();
        let t0 = (self.min - ray.origin) * inv_dir;
        let t1 = (self.max - ray.origin) * inv_dir;
        let near = t0.min(t1).max_element();
        let far = t0.max(t1).min_element();

        if near > far {
            None
        } else {
            Some(AabbHit { near, far })
        }
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}
