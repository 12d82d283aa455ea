use std::path::Path;

use anyhow::Context;

use super::TextureT;

const SRGB_GAMMA: f32 = 2.2;

/// Decoded texel grid, rows top to bottom. Color channels are already linear.
pub struct ImageTex {
    width: u32,
    height: u32,
    texels: Vec<glam::Vec4>,
}

impl ImageTex {
    /// Builds from 8-bit interleaved pixels with 1 to 4 channels.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: usize,
        pixels: &[u8],
        srgb: bool,
    ) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("image size can't be zero");
        }
        if !(1..=4).contains(&channels) {
            anyhow::bail!(format!("unsupported channel count {}", channels));
        }
        let texel_count = width as usize * height as usize;
        if pixels.len() != texel_count * channels {
            anyhow::bail!(format!(
                "expect {} bytes for a {}x{} image with {} channels, got {}",
                texel_count * channels,
                width,
                height,
                channels,
                pixels.len()
            ));
        }

        let texels = pixels
            .chunks_exact(channels)
            .map(|texel| {
                let mut value = glam::Vec4::ONE;
                for (c, byte) in texel.iter().enumerate() {
                    let v = *byte as f32 / 255.0;
                    value[c] = if srgb && c < 3 { v.powf(SRGB_GAMMA) } else { v };
                }
                value
            })
            .collect();

        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Builds from linear float texels, rows top to bottom. No decode is applied.
    pub fn from_linear(width: u32, height: u32, texels: Vec<glam::Vec4>) -> anyhow::Result<Self> {
        if width == 0 || height == 0 {
            anyhow::bail!("image size can't be zero");
        }
        if texels.len() != width as usize * height as usize {
            anyhow::bail!(format!(
                "expect {} texels for a {}x{} image, got {}",
                width as usize * height as usize,
                width,
                height,
                texels.len()
            ));
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    pub fn from_dynamic_image(image: image::DynamicImage, srgb: bool) -> anyhow::Result<Self> {
        let rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_raw(width, height, 4, rgba.as_raw(), srgb)
    }

    pub fn open<P: AsRef<Path>>(path: P, srgb: bool) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let image = image::open(path)
            .context(format!("can't read image '{}'", path.display()))?;
        Self::from_dynamic_image(image, srgb)
    }

    /// Environment maps in `.exr` or `.hdr` keep their float radiance. Other
    /// formats are read as 8-bit sRGB.
    pub fn open_environment<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("exr") => read_exr(path),
            Some("hdr") => read_hdr(path),
            _ => Self::open(path, true),
        }
    }

    fn texel(&self, x: i64, y: i64) -> glam::Vec4 {
        let x = x.rem_euclid(self.width as i64) as usize;
        let y = y.rem_euclid(self.height as i64) as usize;
        self.texels[y * self.width as usize + x]
    }
}

fn read_exr(path: &Path) -> anyhow::Result<ImageTex> {
    let image = exr::image::read::read_first_rgba_layer_from_file(
        path,
        |resolution: exr::math::Vec2<usize>, _| {
            vec![vec![glam::Vec4::ONE; resolution.width()]; resolution.height()]
        },
        |rows: &mut Vec<Vec<glam::Vec4>>,
         pos: exr::math::Vec2<usize>,
         (r, g, b, a): (f32, f32, f32, f32)| {
            rows[pos.height()][pos.width()] = glam::Vec4::new(r, g, b, a)
        },
    )
    .context(format!("can't read exr image '{}'", path.display()))?;

    let rows = image.layer_data.channel_data.pixels;
    let height = rows.len() as u32;
    let width = rows.first().map_or(0, |row| row.len()) as u32;
    ImageTex::from_linear(width, height, rows.into_iter().flatten().collect())
}

fn read_hdr(path: &Path) -> anyhow::Result<ImageTex> {
    let file = std::fs::File::open(path)
        .context(format!("can't open hdr image '{}'", path.display()))?;
    let decoder = image::codecs::hdr::HdrDecoder::new(std::io::BufReader::new(file))
        .context(format!("can't read hdr image '{}'", path.display()))?;
    let meta = decoder.metadata();
    let pixels = decoder
        .read_image_hdr()
        .context(format!("can't decode hdr image '{}'", path.display()))?;
    let texels = pixels
        .iter()
        .map(|p| glam::Vec4::new(p.0[0], p.0[1], p.0[2], 1.0))
        .collect();
    ImageTex::from_linear(meta.width, meta.height, texels)
}

impl TextureT for ImageTex {
    /// Bilinear with wrap-around addressing; `v` grows upwards.
    fn sample(&self, uv: glam::Vec2) -> glam::Vec4 {
        let x = uv.x * self.width as f32 - 0.5;
        let y = (1.0 - uv.y) * self.height as f32 - 0.5;

        let x0 = x.floor();
        let y0 = y.floor();
        let tx = x - x0;
        let ty = y - y0;
        let x0 = x0 as i64;
        let y0 = y0 as i64;

        let top = self.texel(x0, y0).lerp(self.texel(x0 + 1, y0), tx);
        let bottom = self.texel(x0, y0 + 1).lerp(self.texel(x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width, self.height))
    }
}
