use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub};

/// Linear RGB radiance or reflectance.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(value: f32) -> Self {
        Self::new(value, value, value)
    }

    pub fn max_component(&self) -> f32 {
        self.r.max(self.g).max(self.b)
    }

    pub fn is_finite(&self) -> bool {
        self.r.is_finite() && self.g.is_finite() && self.b.is_finite()
    }

    pub fn has_nan(&self) -> bool {
        self.r.is_nan() || self.g.is_nan() || self.b.is_nan()
    }

    /// Componentwise clamp into `[low, high]`.
    pub fn clamp(&self, low: Color, high: Color) -> Color {
        Color::new(
            self.r.max(low.r).min(high.r),
            self.g.max(low.g).min(high.g),
            self.b.max(low.b).min(high.b),
        )
    }

    pub fn saturate(&self) -> Color {
        self.clamp(Color::BLACK, Color::WHITE)
    }

    pub fn lerp(self, other: Color, t: Color) -> Color {
        Color::new(
            self.r + (other.r - self.r) * t.r,
            self.g + (other.g - self.g) * t.g,
            self.b + (other.b - self.b) * t.b,
        )
    }

    pub fn map<F: Fn(f32) -> f32>(&self, f: F) -> Color {
        Color::new(f(self.r), f(self.g), f(self.b))
    }

    /// ACES filmic curve fit, applied before display encoding.
    pub fn tonemap_aces(&self) -> Color {
        const A: f32 = 2.51;
        const B: f32 = 0.03;
        const C: f32 = 2.43;
        const D: f32 = 0.59;
        const E: f32 = 0.14;
        self.map(|x| (x * (A * x + B)) / (x * (C * x + D) + E))
            .saturate()
    }
}

macro_rules! color_binary_ops {
    ( $( ($trait:ident, $func:ident, $assign_trait:ident, $assign_func:ident, $op:tt) ),+ $(,)? ) => {
        $(
            impl $trait for Color {
                type Output = Self;

                fn $func(self, rhs: Self) -> Self::Output {
                    Self::new(self.r $op rhs.r, self.g $op rhs.g, self.b $op rhs.b)
                }
            }
            impl $assign_trait for Color {
                fn $assign_func(&mut self, rhs: Self) {
                    *self = *self $op rhs;
                }
            }
        )+
    };
}

color_binary_ops! {
    (Add, add, AddAssign, add_assign, +),
    (Mul, mul, MulAssign, mul_assign, *),
    (Div, div, DivAssign, div_assign, /),
}

impl Sub for Color {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.r - rhs.r, self.g - rhs.g, self.b - rhs.b)
    }
}

impl Mul<f32> for Color {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.r * rhs, self.g * rhs, self.b * rhs)
    }
}
impl MulAssign<f32> for Color {
    fn mul_assign(&mut self, rhs: f32) {
        *self = *self * rhs;
    }
}
impl Mul<Color> for f32 {
    type Output = Color;

    fn mul(self, rhs: Color) -> Self::Output {
        rhs * self
    }
}

impl Div<f32> for Color {
    type Output = Self;

    fn div(self, rhs: f32) -> Self::Output {
        self * (1.0 / rhs)
    }
}
impl DivAssign<f32> for Color {
    fn div_assign(&mut self, rhs: f32) {
        *self = *self / rhs;
    }
}

impl From<[f32; 3]> for Color {
    fn from(value: [f32; 3]) -> Self {
        Color::new(value[0], value[1], value[2])
    }
}

impl From<glam::Vec3A> for Color {
    fn from(value: glam::Vec3A) -> Self {
        Color::new(value.x, value.y, value.z)
    }
}

impl From<Color> for glam::Vec3A {
    fn from(value: Color) -> Self {
        glam::Vec3A::new(value.r, value.g, value.b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_is_componentwise() {
        let c = Color::new(-1.0, 0.5, 3.0).clamp(Color::BLACK, Color::new(1.0, 1.0, 2.0));
        assert_eq!(c, Color::new(0.0, 0.5, 2.0));
    }

    #[test]
    fn test_tonemap_maps_black_to_black_and_saturates() {
        assert_eq!(Color::BLACK.tonemap_aces(), Color::BLACK);
        let bright = Color::gray(1000.0).tonemap_aces();
        assert!(bright.r <= 1.0 && bright.r > 0.99);
    }

    #[test]
    fn test_lerp_by_color_weight() {
        let a = Color::gray(0.0);
        let b = Color::gray(2.0);
        let c = a.lerp(b, Color::new(0.0, 0.5, 1.0));
        assert_eq!(c, Color::new(0.0, 1.0, 2.0));
    }
}
