/// Affine transform stored as an origin plus a linear basis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub origin: glam::Vec3A,
    pub basis: glam::Mat3A,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        origin: glam::Vec3A::ZERO,
        basis: glam::Mat3A::IDENTITY,
    };

    pub fn new(origin: glam::Vec3A, basis: glam::Mat3A) -> Self {
        Self { origin, basis }
    }

    /// Builds `T * R * S`: basis columns are the rotated axes scaled per axis.
    pub fn from_trs(translation: glam::Vec3A, rotation: glam::Quat, scale: glam::Vec3A) -> Self {
        let rot = glam::Mat3A::from_quat(rotation);
        let basis = glam::Mat3A::from_cols(
            rot.x_axis * scale.x,
            rot.y_axis * scale.y,
            rot.z_axis * scale.z,
        );
        Self::new(translation, basis)
    }

    pub fn from_translation(translation: glam::Vec3A) -> Self {
        Self::new(translation, glam::Mat3A::IDENTITY)
    }

    pub fn from_mat4(mat: glam::Mat4) -> Self {
        let affine = glam::Affine3A::from_mat4(mat);
        Self::new(affine.translation, affine.matrix3)
    }

    pub fn transform_point(&self, point: glam::Vec3A) -> glam::Vec3A {
        self.basis * point + self.origin
    }

    pub fn transform_vector(&self, vector: glam::Vec3A) -> glam::Vec3A {
        self.basis * vector
    }

    /// Inverse-transpose of the basis, for normals and tangents under non-uniform scale.
    pub fn normal_matrix(&self) -> glam::Mat3A {
        self.basis.inverse().transpose()
    }

    pub fn transform_normal(&self, normal: glam::Vec3A) -> glam::Vec3A {
        (self.normal_matrix() * normal).normalize()
    }

    pub fn scale(&self) -> glam::Vec3A {
        glam::Vec3A::new(
            self.basis.x_axis.length(),
            self.basis.y_axis.length(),
            self.basis.z_axis.length(),
        )
    }

    pub fn inverse(&self) -> Transform {
        let basis = self.basis.inverse();
        Transform::new(basis * -self.origin, basis)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Transform {
    type Output = Transform;

    fn mul(self, rhs: Self) -> Self::Output {
        Transform::new(self.basis * rhs.origin + self.origin, self.basis * rhs.basis)
    }
}
