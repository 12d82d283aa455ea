mod image_tex;
mod scalar;

pub use image_tex::*;
pub use scalar::*;

#[enum_dispatch::enum_dispatch(Texture)]
pub trait TextureT: Send + Sync {
    /// RGBA at texture coordinate `uv`. Channels the source lacks read as 1.
    fn sample(&self, uv: glam::Vec2) -> glam::Vec4;

    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }
}

#[enum_dispatch::enum_dispatch]
pub enum Texture {
    ScalarTex,
    ImageTex,
}
