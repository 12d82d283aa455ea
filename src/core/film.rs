use std::path::Path;

use anyhow::Context;
use image::{Rgba, RgbaImage};

use crate::core::color::Color;

const DISPLAY_GAMMA: f32 = 2.2;

/// Running average of one pixel's samples.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PixelEntry {
    pub color: Color,
    pub alpha: f32,
    /// Set once an opaque sample lands while compositing over a transparent background.
    pub claimed: bool,
    pub samples: u32,
}

impl PixelEntry {
    pub fn add_sample(&mut self, color: Color, alpha: f32, transparent_background: bool) {
        let n = self.samples as f32;
        self.samples += 1;

        if transparent_background {
            if alpha > 0.5 && !self.claimed {
                self.color = color;
                self.alpha = 1.0 / (n + 1.0);
                self.claimed = true;
                return;
            } else if alpha < 0.5 && self.claimed {
                self.alpha = (self.alpha * n + alpha) / (n + 1.0);
                return;
            } else if alpha < 0.5 {
                return;
            }
        }

        self.color = (self.color * n + color) / (n + 1.0);
        self.alpha = (self.alpha * n + alpha) / (n + 1.0);
    }
}

/// Accumulation buffer, stored row-major from the top row.
pub struct Film {
    width: u32,
    height: u32,
    transparent_background: bool,
    pixels: Vec<PixelEntry>,
}

impl Film {
    pub fn new(width: u32, height: u32, transparent_background: bool) -> Self {
        Self {
            width,
            height,
            transparent_background,
            pixels: vec![PixelEntry::default(); width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn transparent_background(&self) -> bool {
        self.transparent_background
    }

    fn index_of(&self, x: u32, y: u32) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) is outside a {}x{} film",
            x,
            y,
            self.width,
            self.height
        );
        (y * self.width + x) as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> &PixelEntry {
        &self.pixels[self.index_of(x, y)]
    }

    pub fn add_sample(&mut self, x: u32, y: u32, color: Color, alpha: f32) {
        let index = self.index_of(x, y);
        let transparent = self.transparent_background;
        self.pixels[index].add_sample(color, alpha, transparent);
    }

    /// Rows as disjoint mutable slices, so each row has exactly one writer.
    pub fn rows_mut(&mut self) -> std::slice::ChunksMut<'_, PixelEntry> {
        self.pixels.chunks_mut(self.width as usize)
    }

    /// Tonemapped, gamma-encoded RGBA8 with linear alpha.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut image = RgbaImage::new(self.width, self.height);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let entry = &self.pixels[(y * self.width + x) as usize];
            let color = entry
                .color
                .tonemap_aces()
                .map(|c| c.powf(1.0 / DISPLAY_GAMMA));
            *pixel = Rgba([
                to_byte(color.r),
                to_byte(color.g),
                to_byte(color.b),
                to_byte(entry.alpha),
            ]);
        }
        image
    }

    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .context(format!("can't create output directory '{}'", dir.display()))?;
        }
        self.to_rgba_image()
            .save_with_format(path, image::ImageFormat::Png)
            .context(format!("failed to save image to '{}'", path.display()))
    }
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
}
