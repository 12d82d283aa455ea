mod integrator;
mod pt;
mod util;

pub use integrator::*;
pub use pt::*;
pub use util::{create_image_ranges, render_progress_bar, ImageRange};

use std::path::PathBuf;

use crate::core::film::Film;

/// Where snapshots go. Without a filename nothing is written.
#[derive(Clone, Debug, Default)]
pub struct OutputConfig {
    pub output_filename: Option<PathBuf>,
}

impl OutputConfig {
    pub fn new(output_filename: PathBuf) -> Self {
        Self {
            output_filename: Some(output_filename),
        }
    }

    pub fn save(&self, film: &Film, sample: u32) -> anyhow::Result<()> {
        if let Some(path) = &self.output_filename {
            film.save_png(path)?;
            log::info!("saved '{}' after {} samples", path.display(), sample + 1);
        }
        Ok(())
    }
}

pub trait RendererT {
    fn render(&self, output: &OutputConfig) -> anyhow::Result<Film>;
}
