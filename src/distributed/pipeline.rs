use std::{
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
    time::Duration,
};

use crossbeam::queue::SegQueue;

use crate::{
    camera::pixel_to_ndc,
    core::{color::Color, film::Film, rng::Rng, scene::Scene},
    loader::RenderSettings,
    renderer::{
        render_progress_bar, DirectOutcome, Integrator, OutputConfig, RendererT, SurfaceEvent,
        SurfacePoint,
    },
};

use super::{
    record::{nearest_report, shadow_report, RayId, RayRecord, RayStage, SurfaceHit},
    reduction::Reduction,
};

const IDLE_SLEEP: Duration = Duration::from_millis(1);
/// Russian roulette starts once this many bounces or fewer remain.
const ROULETTE_BOUNCES: u32 = 2;

struct Queues {
    intersect: Vec<SegQueue<RayRecord>>,
    shadow: Vec<SegQueue<RayRecord>>,
    intersect_reduce: SegQueue<RayRecord>,
    shadow_reduce: SegQueue<RayRecord>,
    shading: SegQueue<RayRecord>,
    lighting: SegQueue<RayRecord>,
    completed: SegQueue<RayRecord>,
}

impl Queues {
    fn new(num_partitions: usize) -> Self {
        Self {
            intersect: (0..num_partitions).map(|_| SegQueue::new()).collect(),
            shadow: (0..num_partitions).map(|_| SegQueue::new()).collect(),
            intersect_reduce: SegQueue::new(),
            shadow_reduce: SegQueue::new(),
            shading: SegQueue::new(),
            lighting: SegQueue::new(),
            completed: SegQueue::new(),
        }
    }

    /// Pushes `record` to the queue of its stage. Intersection stages fan out to every partition.
    fn dispatch(&self, mut record: RayRecord) {
        if record.stage == RayStage::Initial {
            record.stage = if record.bounce == 0 {
                RayStage::Completed
            } else {
                RayStage::Intersect
            };
        }

        match record.stage {
            RayStage::Initial => unreachable!(),
            RayStage::Intersect => self.intersect.iter().for_each(|q| q.push(record)),
            RayStage::ShadowIntersect => self.shadow.iter().for_each(|q| q.push(record)),
            RayStage::IntersectReduce => self.intersect_reduce.push(record),
            RayStage::ShadowReduce => self.shadow_reduce.push(record),
            RayStage::Shading => self.shading.push(record),
            RayStage::Lighting => self.lighting.push(record),
            RayStage::Completed => self.completed.push(record),
        }
    }
}

/// Runs `step` until `terminate` is set, sleeping briefly whenever it finds no work.
fn poll<F: FnMut() -> bool>(terminate: &AtomicBool, mut step: F) {
    while !terminate.load(Ordering::Acquire) {
        if !step() {
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}

/// Sets `failed` when the thread holding it unwinds.
struct FailOnPanic<'a> {
    failed: &'a AtomicBool,
}

impl Drop for FailOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.failed.store(true, Ordering::Release);
        }
    }
}

/// Blocks until `target` rays have completed. Returns false if a stage failed first.
fn wait_for_completed(completed: &AtomicU64, target: u64, failed: &AtomicBool) -> bool {
    while completed.load(Ordering::Acquire) < target {
        if failed.load(Ordering::Acquire) {
            return false;
        }
        std::thread::sleep(IDLE_SLEEP);
    }
    true
}

/// Ends a path with probability `1 - max(throughput)` once few bounces remain.
/// A surviving path is reweighted by the survival probability.
fn survives_roulette(throughput: &mut Color, bounce: u32, rng: &mut Rng) -> bool {
    if bounce == 0 || bounce > ROULETTE_BOUNCES {
        return true;
    }
    let survival = throughput.max_component().min(1.0);
    if survival <= 0.0 || rng.uniform_1d() >= survival {
        return false;
    }
    *throughput /= survival;
    true
}

/// Stage transitions that need no geometry, only the sun, the environment and the hit.
struct Stages<'a> {
    integrator: Integrator<'a>,
}

impl Stages<'_> {
    fn resolve_intersection(&self, record: &mut RayRecord) {
        if record.hit.is_some() {
            record.stage = RayStage::Shading;
            return;
        }

        let (color, alpha) = self.integrator.miss(&record.ray).composite();
        record.radiance += record.throughput * color;
        if record.bounce == self.integrator.bounce_count() {
            record.alpha = alpha;
        }
        record.complete();
    }

    fn shade(&self, record: &mut RayRecord, rng: &mut Rng) {
        let point = match record.hit {
            Some(hit) => hit.point,
            None => return record.complete(),
        };

        match self.integrator.surface_event(&point, &record.ray, rng) {
            SurfaceEvent::PassThrough(ray) => record.continue_along(ray, RayStage::Intersect),
            SurfaceEvent::Terminated => record.complete(),
            SurfaceEvent::Shade(state) => {
                record.shade = Some(state);
                record.stage = if state.sun.is_some() {
                    RayStage::ShadowIntersect
                } else {
                    RayStage::Lighting
                };
            }
        }
    }

    fn light(&self, record: &mut RayRecord, rng: &mut Rng) {
        let (point, state) = match (record.hit, record.shade) {
            (Some(hit), Some(state)) => (hit.point, state),
            _ => {
                log::warn!("ray {:?} reached lighting without a shaded hit", record.id);
                return record.complete();
            }
        };

        let outcome = self
            .integrator
            .resolve_direct(&point, &state, record.sun_visible, record.bounce);
        let direct = match outcome {
            DirectOutcome::PassThrough => {
                let ray = point.pass_through(&record.ray);
                return record.continue_along(ray, RayStage::Intersect);
            }
            DirectOutcome::Terminated => return record.complete(),
            DirectOutcome::Lit(direct) => direct,
        };
        record.radiance += record.throughput * (direct + point.emissive);

        let sample = match self.integrator.sample_indirect(&point, &state, rng) {
            Some(sample) => sample,
            None => return record.complete(),
        };
        let weight = self.integrator.indirect_weight(
            &point,
            &state,
            &sample,
            record.throughput,
            record.bounce,
        );
        record.throughput *= weight;
        record.bounce -= 1;

        if !survives_roulette(&mut record.throughput, record.bounce, rng) {
            return record.complete();
        }
        record.continue_along(sample.ray, RayStage::Initial);
    }
}

/// Renders with rays flowing through stage queues. Each partition holds part of
/// the geometry and reports a nearest hit for every ray, so the reductions wait
/// for `num_workers` reports per ray.
pub struct PipelineRenderer<'a> {
    partitions: &'a [Scene],
    settings: &'a RenderSettings,
    num_workers: usize,
}

impl<'a> PipelineRenderer<'a> {
    pub fn new(
        partitions: &'a [Scene],
        settings: &'a RenderSettings,
        num_workers: usize,
    ) -> anyhow::Result<Self> {
        if partitions.is_empty() {
            anyhow::bail!("the pipeline needs at least one scene partition");
        }
        if num_workers != partitions.len() {
            anyhow::bail!(format!(
                "expected {} partition workers but {} partitions are loaded",
                num_workers,
                partitions.len()
            ));
        }
        if settings.visualize_kd_tree_depth != 0 {
            log::warn!("kd-tree visualization is not supported by the pipeline, ignoring it");
        }
        Ok(Self {
            partitions,
            settings,
            num_workers,
        })
    }

    fn seed_wave(&self, queues: &Queues, sample: u32, rng: &mut Rng) {
        let settings = self.settings;
        let camera_scene = &self.partitions[0];
        let aspect = settings.aspect();
        for y in 0..settings.height {
            for x in 0..settings.width {
                let offset = if sample == 0 {
                    (0.5, 0.5)
                } else {
                    rng.uniform_2d()
                };
                let ndc = pixel_to_ndc(x, y, offset, settings.width, settings.height);
                let ray = camera_scene.camera_ray(ndc, aspect);
                let id = RayId { x, y, sample };
                queues.dispatch(RayRecord::camera(id, ray, settings.bounce_count));
            }
        }
    }
}

impl RendererT for PipelineRenderer<'_> {
    fn render(&self, output: &OutputConfig) -> anyhow::Result<Film> {
        let settings = self.settings;
        let pixels = settings.width as u64 * settings.height as u64;
        let total = pixels * settings.sample_count as u64;
        if total == 0 {
            return Ok(Film::new(
                settings.width,
                settings.height,
                settings.transparent_background,
            ));
        }

        let num_surface_workers = (settings.threads() / 2).max(1);
        log::info!(
            "rendering {}x{} with {} samples through {} partitions and {} shading workers",
            settings.width,
            settings.height,
            settings.sample_count,
            self.partitions.len(),
            num_surface_workers
        );

        let queues = Queues::new(self.partitions.len());
        let terminate = AtomicBool::new(false);
        let failed = AtomicBool::new(false);
        let completed = AtomicU64::new(0);
        let stages = Stages {
            integrator: Integrator::new(&self.partitions[0], settings),
        };
        let progress_bar = render_progress_bar(total);

        let film = crossbeam::scope(|scope| {
            let queues = &queues;
            let terminate = &terminate;
            let failed = &failed;
            let completed = &completed;
            let stages = &stages;
            let _guard = FailOnPanic { failed };

            for (index, scene) in self.partitions.iter().enumerate() {
                scope.spawn(move |_| {
                    let _guard = FailOnPanic { failed };
                    poll(terminate, || {
                        let mut worked = false;
                        if let Some(mut record) = queues.intersect[index].pop() {
                            record.hit = scene.intersect(&record.ray).map(|inter| SurfaceHit {
                                distance: inter.distance,
                                point: SurfacePoint::from_intersection(&inter),
                            });
                            record.stage = RayStage::IntersectReduce;
                            queues.dispatch(record);
                            worked = true;
                        }
                        if let Some(mut record) = queues.shadow[index].pop() {
                            record.sun_visible = record
                                .shade
                                .and_then(|state| state.sun)
                                .map(|sun| !scene.occluded(&sun.ray));
                            record.stage = RayStage::ShadowReduce;
                            queues.dispatch(record);
                            worked = true;
                        }
                        worked
                    })
                });
            }

            let num_workers = self.num_workers;
            scope.spawn(move |_| {
                let _guard = FailOnPanic { failed };
                let mut reduction = Reduction::new(num_workers, nearest_report);
                poll(terminate, || match queues.intersect_reduce.pop() {
                    Some(report) => {
                        if let Some(mut record) = reduction.report(report) {
                            stages.resolve_intersection(&mut record);
                            queues.dispatch(record);
                        }
                        true
                    }
                    None => false,
                });
                log::debug!(
                    "intersection reduction exits with {} rays pending",
                    reduction.in_flight()
                );
            });

            scope.spawn(move |_| {
                let _guard = FailOnPanic { failed };
                let mut reduction = Reduction::new(num_workers, shadow_report);
                poll(terminate, || match queues.shadow_reduce.pop() {
                    Some(report) => {
                        if let Some(mut record) = reduction.report(report) {
                            record.stage = RayStage::Lighting;
                            queues.dispatch(record);
                        }
                        true
                    }
                    None => false,
                });
                log::debug!(
                    "shadow reduction exits with {} rays pending",
                    reduction.in_flight()
                );
            });

            for _ in 0..num_surface_workers {
                scope.spawn(move |_| {
                    let _guard = FailOnPanic { failed };
                    let mut rng = Rng::new();
                    poll(terminate, || {
                        let mut worked = false;
                        if let Some(mut record) = queues.shading.pop() {
                            stages.shade(&mut record, &mut rng);
                            queues.dispatch(record);
                            worked = true;
                        }
                        if let Some(mut record) = queues.lighting.pop() {
                            stages.light(&mut record, &mut rng);
                            queues.dispatch(record);
                            worked = true;
                        }
                        worked
                    })
                });
            }

            let progress_bar = progress_bar.clone();
            let accumulator = scope.spawn(move |_| -> anyhow::Result<Film> {
                let _guard = FailOnPanic { failed };
                let mut film = Film::new(
                    settings.width,
                    settings.height,
                    settings.transparent_background,
                );
                let mut save_error = None;
                poll(terminate, || match queues.completed.pop() {
                    Some(record) => {
                        let RayId { x, y, .. } = record.id;
                        film.add_sample(x, y, record.radiance, record.alpha);
                        progress_bar.inc(1);
                        let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                        if done % pixels == 0 {
                            let sample = (done / pixels - 1) as u32;
                            if settings.should_save(sample) {
                                if let Err(err) = output.save(&film, sample) {
                                    log::error!("failed to save snapshot: {:?}", err);
                                    save_error.get_or_insert(err);
                                }
                            }
                        }
                        true
                    }
                    None => false,
                });
                match save_error {
                    Some(err) => Err(err),
                    None => Ok(film),
                }
            });

            scope.spawn(move |_| {
                if !wait_for_completed(completed, total, failed) {
                    log::error!("a pipeline stage failed, stopping");
                }
                terminate.store(true, Ordering::Release);
            });

            // waves keep each pixel's samples in order
            let mut rng = Rng::new();
            for sample in 0..settings.sample_count {
                if !wait_for_completed(completed, sample as u64 * pixels, failed) {
                    break;
                }
                self.seed_wave(queues, sample, &mut rng);
            }

            accumulator.join()
        })
        .map_err(|_| anyhow::anyhow!("a pipeline stage panicked"))?
        .map_err(|_| anyhow::anyhow!("the accumulator panicked"))??;

        progress_bar.finish();
        Ok(film)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roulette_only_near_the_end() {
        let mut rng = Rng::with_seed(31);
        let mut throughput = Color::gray(0.01);
        assert!(survives_roulette(&mut throughput, 3, &mut rng));
        assert!(survives_roulette(&mut throughput, 0, &mut rng));
        assert_eq!(throughput, Color::gray(0.01));
    }

    #[test]
    fn test_roulette_ends_dark_paths() {
        let mut rng = Rng::with_seed(32);
        for &bounce in [1, 2].iter() {
            let mut throughput = Color::BLACK;
            assert!(!survives_roulette(&mut throughput, bounce, &mut rng));
        }
    }

    #[test]
    fn test_roulette_reweights_survivors() {
        let mut rng = Rng::with_seed(33);
        let mut survived = 0;
        for _ in 0..4000 {
            let mut throughput = Color::new(0.25, 0.5, 0.1);
            if survives_roulette(&mut throughput, 2, &mut rng) {
                survived += 1;
                assert!((throughput.r - 0.5).abs() < 1e-6);
                assert!((throughput.g - 1.0).abs() < 1e-6);
                assert!((throughput.b - 0.2).abs() < 1e-6);
            }
        }
        // survival probability is max(throughput) = 0.5
        assert!(survived > 1800 && survived < 2200, "{} survived", survived);
    }

    #[test]
    fn test_bright_paths_always_survive() {
        let mut rng = Rng::with_seed(34);
        for _ in 0..100 {
            let mut throughput = Color::new(1.5, 0.2, 0.2);
            assert!(survives_roulette(&mut throughput, 1, &mut rng));
            assert_eq!(throughput, Color::new(1.5, 0.2, 0.2));
        }
    }

    #[test]
    fn test_stage_panic_releases_waiters() {
        let failed = AtomicBool::new(false);
        let completed = AtomicU64::new(0);
        let result = crossbeam::scope(|scope| {
            let failed = &failed;
            scope.spawn(move |_| {
                let _guard = FailOnPanic { failed };
                panic!("stage failed");
            });
            wait_for_completed(&completed, 10, failed)
        });
        assert!(result.is_err());
        assert!(failed.load(Ordering::Acquire));
    }

    #[test]
    fn test_wait_returns_once_target_reached() {
        let failed = AtomicBool::new(false);
        let completed = AtomicU64::new(5);
        assert!(wait_for_completed(&completed, 5, &failed));
        failed.store(true, Ordering::Release);
        assert!(!wait_for_completed(&completed, 6, &failed));
    }
}
