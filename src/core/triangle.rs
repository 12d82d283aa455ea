use crate::core::{ray::Ray, EPSILON};

/// Triangle stored by value, so kd-tree leaves keep their own copies.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Triangle {
    pub a: glam::Vec3A,
    pub b: glam::Vec3A,
    pub c: glam::Vec3A,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TriangleHit {
    /// Negative when the plane is hit behind the ray origin.
    pub distance: f32,
    /// Weights `(alpha, beta, gamma)` for vertices `a`, `b` and `c`.
    pub barycentric: glam::Vec3A,
}

impl TriangleHit {
    pub fn has_hit(&self) -> bool {
        self.distance >= 0.0
    }
}

impl Triangle {
    pub fn new(a: glam::Vec3A, b: glam::Vec3A, c: glam::Vec3A) -> Self {
        Self { a, b, c }
    }

    pub fn min_on_axis(&self, axis: usize) -> f32 {
        self.a[axis].min(self.b[axis]).min(self.c[axis])
    }

    pub fn max_on_axis(&self, axis: usize) -> f32 {
        self.a[axis].max(self.b[axis]).max(self.c[axis])
    }

    /// Solves `[a-b, a-c, dir] * [beta, gamma, t] = a - origin` with Cramer's rule.
    ///
    /// Barycentric bounds are widened by `EPSILON` so rays grazing a shared edge
    /// still register on one of the two triangles.
    pub fn intersect(&self, ray: &Ray) -> Option<TriangleHit> {
        let col0 = self.a - self.b;
        let col1 = self.a - self.c;
        let col2 = ray.direction();
        let v = self.a - ray.origin;

        let det = col0.dot(col1.cross(col2));
        if det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;

        let beta = v.dot(col1.cross(col2)) * inv_det;
        if beta < -EPSILON || beta > 1.0 + EPSILON {
            return None;
        }

        let gamma = col0.dot(v.cross(col2)) * inv_det;
        if gamma < -EPSILON || beta + gamma > 1.0 + EPSILON {
            return None;
        }

        let distance = col0.dot(col1.cross(v)) * inv_det;
        let alpha = 1.0 - beta - gamma;

        Some(TriangleHit {
            distance,
            barycentric: glam::Vec3A::new(alpha, beta, gamma),
        })
    }
}

impl std::ops::Index<usize> for Triangle {
    type Output = glam::Vec3A;

    fn index(&self, index: usize) -> &Self::Output {
        match index {
            0 => &self.a,
            1 => &self.b,
            2 => &self.c,
            _ => panic!("triangle vertex index {} out of range", index),
        }
    }
}
