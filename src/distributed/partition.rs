use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::loader::mesh_name;

use super::{SceneInfo, WorkerAssignment};

/// Estimated memory footprint of one mesh primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimitiveSize {
    pub mesh: String,
    pub primitive: usize,
    pub size: u64,
}

/// Sizes every primitive reachable from the scene's nodes in document order,
/// each mesh counted once.
pub fn primitive_sizes(
    doc: &gltf::Document,
    base_dir: &Path,
) -> anyhow::Result<Vec<PrimitiveSize>> {
    let scene = doc
        .default_scene()
        .or_else(|| doc.scenes().next())
        .context("glTF document has no scene")?;

    let mut visited = HashSet::new();
    let mut sizes = Vec::new();
    for node in scene.nodes() {
        visit_node(&node, base_dir, &mut visited, &mut sizes)?;
    }
    Ok(sizes)
}

fn visit_node(
    node: &gltf::Node,
    base_dir: &Path,
    visited: &mut HashSet<usize>,
    sizes: &mut Vec<PrimitiveSize>,
) -> anyhow::Result<()> {
    if let Some(mesh) = node.mesh() {
        if visited.insert(mesh.index()) {
            let name = mesh_name(&mesh);
            for prim in mesh.primitives() {
                sizes.push(PrimitiveSize {
                    mesh: name.clone(),
                    primitive: prim.index(),
                    size: primitive_size(&prim, base_dir)?,
                });
            }
        }
    }
    for child in node.children() {
        visit_node(&child, base_dir, visited, sizes)?;
    }
    Ok(())
}

fn primitive_size(prim: &gltf::Primitive, base_dir: &Path) -> anyhow::Result<u64> {
    let semantics = [
        gltf::Semantic::Positions,
        gltf::Semantic::Normals,
        gltf::Semantic::Tangents,
        gltf::Semantic::TexCoords(0),
    ];
    let mut size: u64 = semantics
        .iter()
        .filter_map(|semantic| prim.get(semantic))
        .filter_map(|accessor| accessor.view())
        .map(|view| view.length() as u64)
        .sum();

    let material = prim.material();
    let pbr = material.pbr_metallic_roughness();
    let textures = [
        pbr.base_color_texture().map(|info| info.texture()),
        pbr.metallic_roughness_texture().map(|info| info.texture()),
        material.normal_texture().map(|info| info.texture()),
        material.occlusion_texture().map(|info| info.texture()),
        material.emissive_texture().map(|info| info.texture()),
    ];
    let mut images = HashSet::new();
    for texture in textures.iter().flatten() {
        let image = texture.source();
        if images.insert(image.index()) {
            size += image_size(&image, base_dir)?;
        }
    }

    Ok(size)
}

fn image_size(image: &gltf::Image, base_dir: &Path) -> anyhow::Result<u64> {
    match image.source() {
        gltf::image::Source::View { view, .. } => Ok(view.length() as u64),
        gltf::image::Source::Uri { uri, .. } => {
            if uri.starts_with("data:") {
                return Ok(uri.len() as u64);
            }
            let path: PathBuf = base_dir.join(uri);
            let meta = std::fs::metadata(&path)
                .context(format!("can't read texture '{}'", path.display()))?;
            Ok(meta.len())
        }
    }
}

/// Packs primitives in order, opening a new worker whenever the next one would push
/// the current worker past `memory_per_worker`. A primitive larger than the limit
/// gets a worker of its own.
pub fn assign_greedy(sizes: &[PrimitiveSize], memory_per_worker: u64) -> Vec<SceneInfo> {
    let mut workers = vec![SceneInfo::default()];
    for prim in sizes {
        let needs_new = workers.last().map_or(false, |current| {
            current.total_size > 0 && current.total_size + prim.size > memory_per_worker
        });
        if needs_new {
            workers.push(SceneInfo::default());
        }
        if let Some(current) = workers.last_mut() {
            current
                .work
                .entry(prim.mesh.clone())
                .or_default()
                .push(prim.primitive);
            current.total_size += prim.size;
        }
    }
    workers
}

/// Splits the glTF at `path` into worker assignments.
pub fn plan_partitions<P: AsRef<Path>>(
    path: P,
    memory_per_worker: u64,
) -> anyhow::Result<Vec<WorkerAssignment>> {
    let path = path.as_ref();
    if memory_per_worker == 0 {
        anyhow::bail!("memory per worker must be positive");
    }
    let gltf = gltf::Gltf::open(path).context(format!("can't open '{}'", path.display()))?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

    let sizes = primitive_sizes(&gltf.document, base_dir)?;
    let workers = assign_greedy(&sizes, memory_per_worker);
    let num_workers = workers.len();
    log::info!(
        "planned {} primitives onto {} workers",
        sizes.len(),
        num_workers
    );

    let scene_root = base_dir.to_string_lossy().into_owned();
    Ok(workers
        .into_iter()
        .enumerate()
        .map(|(index, scene_info)| WorkerAssignment {
            scene_info,
            scene_bucket: String::new(),
            scene_root: scene_root.clone(),
            worker_id: (index + 1).to_string(),
            num_workers,
        })
        .collect())
}
