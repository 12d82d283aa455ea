use super::TextureT;

pub struct ScalarTex {
    value: glam::Vec4,
}

impl ScalarTex {
    pub fn new(value: glam::Vec4) -> Self {
        Self { value }
    }
}

impl TextureT for ScalarTex {
    fn sample(&self, _uv: glam::Vec2) -> glam::Vec4 {
        self.value
    }
}
