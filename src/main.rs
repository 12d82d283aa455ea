use std::path::{Path, PathBuf};

use anyhow::Context;
use structopt::StructOpt;

use kd_path_tracer::{
    distributed::{plan_partitions, PipelineRenderer, WorkerAssignment},
    loader::{self, RenderSettings},
    renderer::{OutputConfig, PathTracer, RendererT},
    core::scene::Scene,
    storage::{LocalObjectStore, ObjectData},
};

#[derive(StructOpt)]
#[structopt(name = "kd-path-tracer", about = "Path tracer for glTF scenes")]
enum Command {
    /// Render on a local thread pool
    Render {
        #[structopt(parse(from_os_str))]
        scene: PathBuf,
        #[structopt(flatten)]
        args: RenderArgs,
    },
    /// Render through the staged pipeline, one partition per assignment file
    Distributed {
        #[structopt(parse(from_os_str))]
        scene: PathBuf,
        #[structopt(long, required = true, parse(from_os_str))]
        assignments: Vec<PathBuf>,
        #[structopt(flatten)]
        args: RenderArgs,
    },
    /// Split a scene into worker assignments
    Plan {
        #[structopt(parse(from_os_str))]
        scene: PathBuf,
        #[structopt(long)]
        memory_per_worker: u64,
        /// Write one `worker_<id>.json` per worker here instead of printing
        #[structopt(long, parse(from_os_str))]
        output_dir: Option<PathBuf>,
    },
}

#[derive(StructOpt)]
struct RenderArgs {
    #[structopt(short, long, parse(from_os_str))]
    settings: Option<PathBuf>,
    #[structopt(short, long, parse(from_os_str), default_value = "output.png")]
    output: PathBuf,
    #[structopt(long)]
    width: Option<u32>,
    #[structopt(long)]
    height: Option<u32>,
    #[structopt(long)]
    samples: Option<u32>,
    #[structopt(long)]
    bounces: Option<u32>,
    #[structopt(long)]
    threads: Option<usize>,
    /// Read the scene from a local object store instead of the file system
    #[structopt(long, parse(from_os_str))]
    store_root: Option<PathBuf>,
    #[structopt(long, default_value = "scenes")]
    bucket: String,
}

impl RenderArgs {
    fn settings(&self) -> anyhow::Result<RenderSettings> {
        let mut settings = match &self.settings {
            Some(path) => RenderSettings::load(path)?,
            None => RenderSettings::default(),
        };
        if let Some(width) = self.width {
            settings.width = width;
        }
        if let Some(height) = self.height {
            settings.height = height;
        }
        if let Some(samples) = self.samples {
            settings.sample_count = samples;
        }
        if let Some(bounces) = self.bounces {
            settings.bounce_count = bounces;
        }
        if let Some(threads) = self.threads {
            settings.thread_count = threads;
        }
        if settings.width == 0 || settings.height == 0 {
            anyhow::bail!("resolution must be positive");
        }
        Ok(settings)
    }

    /// With a store the scene path is an object key, prefixed by the assignment's scene
    /// root. The document and its external files are staged in a temporary directory.
    fn load_scene(
        &self,
        scene: &Path,
        settings: &RenderSettings,
        assignment: Option<&WorkerAssignment>,
    ) -> anyhow::Result<Scene> {
        let root = match &self.store_root {
            Some(root) => root,
            None => {
                let data = ObjectData::Path(scene.to_path_buf());
                return loader::load_scene(&data, settings, assignment);
            }
        };
        let store = LocalObjectStore::new(root);
        let (bucket, key) = match assignment {
            Some(a) if !a.scene_bucket.is_empty() => {
                (a.scene_bucket.as_str(), Path::new(&a.scene_root).join(scene))
            }
            _ => (self.bucket.as_str(), scene.to_path_buf()),
        };
        let staging = tempfile::tempdir().context("can't create a staging directory")?;
        let local = loader::fetch_scene(&store, bucket, &key.to_string_lossy(), staging.path())?;
        loader::load_scene(&ObjectData::Path(local), settings, assignment)
    }

    fn output(&self) -> OutputConfig {
        OutputConfig::new(self.output.clone())
    }
}

fn render(scene: &Path, args: &RenderArgs) -> anyhow::Result<()> {
    let settings = args.settings()?;
    log::info!("loading scene '{}'", scene.display());
    let scene = args.load_scene(scene, &settings, None)?;

    log::info!("scene is loaded, rendering...");
    let begin_time = std::time::Instant::now();
    PathTracer::new(&scene, &settings).render(&args.output())?;
    log::info!("finished, time used: {:?}", begin_time.elapsed());
    Ok(())
}

fn render_distributed(
    scene: &Path,
    assignment_paths: &[PathBuf],
    args: &RenderArgs,
) -> anyhow::Result<()> {
    let settings = args.settings()?;
    let assignments = assignment_paths
        .iter()
        .map(WorkerAssignment::load)
        .collect::<anyhow::Result<Vec<_>>>()?;
    let num_workers = assignments
        .first()
        .map(|a| a.num_workers)
        .context("no worker assignments given")?;
    if let Some(a) = assignments.iter().find(|a| a.num_workers != num_workers) {
        anyhow::bail!(format!(
            "worker '{}' expects {} workers, others expect {}",
            a.worker_id, a.num_workers, num_workers
        ));
    }

    let mut partitions = Vec::with_capacity(assignments.len());
    for assignment in &assignments {
        log::info!("loading partition of worker '{}'", assignment.worker_id);
        let partition = args
            .load_scene(scene, &settings, Some(assignment))
            .context(format!("worker '{}'", assignment.worker_id))?;
        partitions.push(partition);
    }

    let begin_time = std::time::Instant::now();
    PipelineRenderer::new(&partitions, &settings, num_workers)?.render(&args.output())?;
    log::info!("finished, time used: {:?}", begin_time.elapsed());
    Ok(())
}

fn plan(scene: &Path, memory_per_worker: u64, output_dir: Option<&Path>) -> anyhow::Result<()> {
    let assignments = plan_partitions(scene, memory_per_worker)?;
    match output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .context(format!("can't create '{}'", dir.display()))?;
            for assignment in &assignments {
                let path = dir.join(format!("worker_{}.json", assignment.worker_id));
                std::fs::write(&path, assignment.to_json_string()?)
                    .context(format!("can't write '{}'", path.display()))?;
                log::info!("wrote '{}'", path.display());
            }
        }
        None => println!("{}", serde_json::to_string_pretty(&assignments)?),
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Command::from_args() {
        Command::Render { scene, args } => render(&scene, &args),
        Command::Distributed {
            scene,
            assignments,
            args,
        } => render_distributed(&scene, &assignments, &args),
        Command::Plan {
            scene,
            memory_per_worker,
            output_dir,
        } => plan(&scene, memory_per_worker, output_dir.as_deref()),
    }
}
