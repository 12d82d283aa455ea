use crate::{
    camera::pixel_to_ndc,
    core::{
        film::{Film, PixelEntry},
        rng::Rng,
        scene::Scene,
    },
    loader::RenderSettings,
};

use super::{util, Integrator, OutputConfig, RendererT};

/// Renders one sample of every pixel at a time, spreading rows over a thread pool.
pub struct PathTracer<'a> {
    scene: &'a Scene,
    settings: &'a RenderSettings,
}

impl<'a> PathTracer<'a> {
    pub fn new(scene: &'a Scene, settings: &'a RenderSettings) -> Self {
        Self { scene, settings }
    }
}

impl RendererT for PathTracer<'_> {
    fn render(&self, output: &OutputConfig) -> anyhow::Result<Film> {
        let settings = self.settings;
        let (width, height) = (settings.width, settings.height);
        let transparent = settings.transparent_background;
        let aspect = settings.aspect();
        let mut film = Film::new(width, height, transparent);
        let integrator = Integrator::new(self.scene, settings);

        let num_thread = settings.threads() as u32;
        let ranges = util::create_image_ranges(num_thread, height);
        log::info!(
            "rendering {}x{} with {} samples, {} bounces on {} threads",
            width,
            height,
            settings.sample_count,
            settings.bounce_count,
            ranges.len()
        );

        let progress_bar =
            util::render_progress_bar(settings.sample_count as u64 * height as u64);

        for sample in 0..settings.sample_count {
            let mut rows = film.rows_mut().enumerate();

            crossbeam::scope(|scope| {
                for range in &ranges {
                    let chunk: Vec<(usize, &mut [PixelEntry])> =
                        rows.by_ref().take((range.to - range.from) as usize).collect();
                    let integrator = &integrator;
                    let scene = self.scene;
                    let progress_bar = progress_bar.clone();

                    scope.spawn(move |_| {
                        let mut rng = Rng::new();
                        for (y, row) in chunk {
                            for (x, pixel) in row.iter_mut().enumerate() {
                                // the first sample goes through pixel centers so the
                                // transparent-background claim mask is stable
                                let offset = if sample == 0 {
                                    (0.5, 0.5)
                                } else {
                                    rng.uniform_2d()
                                };
                                let ndc = pixel_to_ndc(x as u32, y as u32, offset, width, height);
                                let ray = scene.camera_ray(ndc, aspect);
                                let (color, alpha) =
                                    integrator.trace_camera_ray(&ray, &mut rng).composite();
                                pixel.add_sample(color, alpha, transparent);
                            }
                            progress_bar.inc(1);
                        }
                    });
                }
            })
            .map_err(|_| anyhow::anyhow!("a render thread panicked at sample {}", sample))?;

            if settings.should_save(sample) {
                output.save(&film, sample)?;
            }
        }

        progress_bar.finish();
        Ok(film)
    }
}
