use crate::core::color::Color;

/// Reflectance at normal incidence for a dielectric with the given ior.
pub fn f0_from_ior(ior: f32) -> f32 {
    let f0 = (ior - 1.0) / (ior + 1.0);
    f0 * f0
}

fn schlick_weight(wo: glam::Vec3A, wi: glam::Vec3A) -> f32 {
    let halfway = (wo + wi).normalize();
    let cos_theta = wo.dot(halfway);
    (1.0 - cos_theta).powi(5)
}

/// Schlick approximation. The halfway vector stands in for the microfacet normal.
pub fn fresnel_schlick(wo: glam::Vec3A, wi: glam::Vec3A, ior: f32) -> f32 {
    let f0 = f0_from_ior(ior);
    f0 + (1.0 - f0) * schlick_weight(wo, wi)
}

pub fn fresnel_schlick_color(f0: Color, wo: glam::Vec3A, wi: glam::Vec3A) -> Color {
    f0.lerp(Color::WHITE, Color::gray(schlick_weight(wo, wi)))
}

pub fn reflect(i: glam::Vec3A, n: glam::Vec3A) -> glam::Vec3A {
    i - 2.0 * i.dot(n) * n
}
