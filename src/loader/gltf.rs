use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use byte_slice_cast::AsSliceOf;

use crate::{
    camera::PerspectiveCamera,
    core::{
        color::Color,
        entity::{EntityId, SceneGraph},
        kd_tree::KdTreeConfig,
        material::{is_shadow_catcher_name, Material},
        mesh::{compute_normals, compute_tangents, Mesh, Vertex},
        model::Model,
        scene::Scene,
        transform::Transform,
    },
    distributed::WorkerAssignment,
    light::{EnvLight, SunLight},
    loader::RenderSettings,
    storage::{FetchTarget, ObjectData, ObjectStore},
    texture::{ImageTex, Texture},
};

/// Name used to match a glTF mesh against worker assignments.
pub fn mesh_name(mesh: &gltf::Mesh) -> String {
    match mesh.name() {
        Some(name) => name.to_owned(),
        None => format!("mesh_{}", mesh.index()),
    }
}

/// Copies the glTF document at `key` into `staging` together with every external
/// buffer and image it references. URIs resolve against the document's directory
/// in the bucket and keep their relative layout, so the copy imports like a local scene.
pub fn fetch_scene(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    staging: &Path,
) -> anyhow::Result<PathBuf> {
    let key_path = Path::new(key);
    let file_name = key_path
        .file_name()
        .context(format!("object key '{}' has no file name", key))?;
    let local = staging.join(file_name);
    store.fetch(bucket, key, FetchTarget::Path(local.clone()))?;

    let gltf = gltf::Gltf::open(&local)
        .context(format!("can't parse glTF scene '{}/{}'", bucket, key))?;
    let key_dir = key_path.parent().unwrap_or_else(|| Path::new(""));

    let buffer_uris = gltf
        .document
        .buffers()
        .filter_map(|buffer| match buffer.source() {
            gltf::buffer::Source::Uri(uri) => Some(uri),
            gltf::buffer::Source::Bin => None,
        });
    let image_uris = gltf
        .document
        .images()
        .filter_map(|image| match image.source() {
            gltf::image::Source::Uri { uri, .. } => Some(uri),
            gltf::image::Source::View { .. } => None,
        });

    let mut fetched = HashSet::new();
    for uri in buffer_uris.chain(image_uris) {
        if uri.starts_with("data:") || !fetched.insert(uri) {
            continue;
        }
        if uri.contains("://") {
            anyhow::bail!(format!("unsupported external uri '{}'", uri));
        }
        let object_key = key_dir.join(uri);
        store
            .fetch(
                bucket,
                &object_key.to_string_lossy(),
                FetchTarget::Path(staging.join(uri)),
            )
            .context(format!("glTF scene '{}/{}'", bucket, key))?;
    }
    log::info!(
        "fetched '{}/{}' with {} external resources",
        bucket,
        key,
        fetched.len()
    );

    Ok(local)
}

/// Loads a glTF document. With an assignment only the primitives it names are
/// loaded, camera and sun always are.
pub fn load_scene(
    data: &ObjectData,
    settings: &RenderSettings,
    assignment: Option<&WorkerAssignment>,
) -> anyhow::Result<Scene> {
    let (gltf_doc, buffers, images) = match data {
        ObjectData::Path(path) => gltf::import(path)
            .context(format!("can't load glTF scene '{}'", path.display()))?,
        ObjectData::Bytes(bytes) => {
            gltf::import_slice(bytes).context("can't load glTF scene from memory")?
        }
    };

    let gltf_camera = gltf_doc
        .cameras()
        .nth(settings.camera_index)
        .context(format!(
            "scene does not contain camera #{}",
            settings.camera_index
        ))?;
    let fov = match gltf_camera.projection() {
        gltf::camera::Projection::Perspective(proj) => proj.yfov(),
        gltf::camera::Projection::Orthographic(_) => anyhow::bail!(format!(
            "camera #{} is orthographic, only perspective cameras are supported",
            settings.camera_index
        )),
    };

    let sun_index = settings.sun_light_index.and_then(|index| {
        let light = gltf_doc.lights().and_then(|mut lights| lights.nth(index));
        match light {
            None => {
                log::warn!(
                    "scene does not contain sun light #{}, no sun light will be used",
                    index
                );
                None
            }
            Some(light) => match light.kind() {
                gltf::khr_lights_punctual::Kind::Directional => Some(index),
                _ => {
                    log::warn!(
                        "light #{} is not a sun light, no sun light will be used",
                        index
                    );
                    None
                }
            },
        }
    });

    let gltf_scene = gltf_doc
        .default_scene()
        .or_else(|| gltf_doc.scenes().next())
        .context("glTF document has no scene")?;

    let mut ctx = LoadContext::new(buffers, images, settings.kd_tree, assignment);
    let mut graph = SceneGraph::new();
    let mut found = FoundEntities {
        camera_index: gltf_camera.index(),
        camera_fov: fov,
        sun_index,
        camera: None,
        sun: None,
    };
    for node in gltf_scene.nodes() {
        parse_nodes(&mut ctx, &mut graph, &mut found, &node, None)?;
    }

    let camera = found.camera.context("scene is missing a camera")?;
    if sun_index.is_some() && found.sun.is_none() {
        log::warn!("sun light is not placed by any node, no sun light will be used");
    }

    let environment = match &settings.environment_image {
        Some(path) => {
            let tex = ImageTex::open_environment(path)?;
            EnvLight::new(Some(Arc::new(tex.into())), settings.environment_factor)
        }
        None => EnvLight::uniform(settings.environment_factor),
    };

    log::info!(
        "loaded scene: {} entities, {} meshes, {} materials, {} textures",
        graph.len(),
        ctx.meshes.len(),
        ctx.materials.len(),
        ctx.textures.len()
    );

    Scene::new(graph, camera, found.sun, environment)
}

struct FoundEntities {
    camera_index: usize,
    camera_fov: f32,
    sun_index: Option<usize>,
    camera: Option<EntityId>,
    sun: Option<EntityId>,
}

/// Decoded data and dedup caches for one load. Everything is dropped with it.
struct LoadContext<'a> {
    buffers: Vec<gltf::buffer::Data>,
    images: Vec<gltf::image::Data>,
    kd_tree: KdTreeConfig,
    assignment: Option<&'a WorkerAssignment>,
    textures: HashMap<(usize, bool), Arc<Texture>>,
    materials: HashMap<Option<usize>, Arc<Material>>,
    meshes: HashMap<(usize, usize), Arc<Mesh>>,
}

impl<'a> LoadContext<'a> {
    fn new(
        buffers: Vec<gltf::buffer::Data>,
        images: Vec<gltf::image::Data>,
        kd_tree: KdTreeConfig,
        assignment: Option<&'a WorkerAssignment>,
    ) -> Self {
        Self {
            buffers,
            images,
            kd_tree,
            assignment,
            textures: HashMap::new(),
            materials: HashMap::new(),
            meshes: HashMap::new(),
        }
    }

    fn texture(&mut self, texture: &gltf::Texture, srgb: bool) -> anyhow::Result<Arc<Texture>> {
        let image_index = texture.source().index();
        if let Some(tex) = self.textures.get(&(image_index, srgb)) {
            return Ok(tex.clone());
        }
        let image = self
            .images
            .get(image_index)
            .context(format!("image {} is missing", image_index))?;
        let tex: Arc<Texture> = Arc::new(image_to_texture(image_index, image, srgb)?.into());
        self.textures.insert((image_index, srgb), tex.clone());
        Ok(tex)
    }

    fn material(&mut self, gltf_mat: &gltf::Material) -> anyhow::Result<Arc<Material>> {
        if let Some(mat) = self.materials.get(&gltf_mat.index()) {
            return Ok(mat.clone());
        }

        let pbr = gltf_mat.pbr_metallic_roughness();
        let base_color = pbr.base_color_factor();
        let mut mat = Material {
            albedo_factor: Color::new(base_color[0], base_color[1], base_color[2]),
            opacity_factor: base_color[3],
            roughness_factor: pbr.roughness_factor(),
            metallic_factor: pbr.metallic_factor(),
            emissive_factor: gltf_mat.emissive_factor().into(),
            shadow_catcher: gltf_mat.name().map_or(false, is_shadow_catcher_name),
            ..Default::default()
        };

        if let Some(info) = gltf_mat.normal_texture() {
            mat.normal_tex = Some(self.texture(&info.texture(), false)?);
        }
        if let Some(info) = pbr.base_color_texture() {
            let tex = self.texture(&info.texture(), true)?;
            if gltf_mat.alpha_mode() != gltf::material::AlphaMode::Opaque {
                mat.opacity_tex = Some(tex.clone());
            }
            mat.albedo_tex = Some(tex);
        }
        if let Some(info) = gltf_mat.occlusion_texture() {
            mat.occlusion_tex = Some(self.texture(&info.texture(), false)?);
        }
        if let Some(info) = pbr.metallic_roughness_texture() {
            let tex = self.texture(&info.texture(), false)?;
            mat.roughness_tex = Some(tex.clone());
            mat.metallic_tex = Some(tex);
        }
        if let Some(info) = gltf_mat.emissive_texture() {
            mat.emissive_tex = Some(self.texture(&info.texture(), true)?);
        }

        let mat = Arc::new(mat);
        self.materials.insert(gltf_mat.index(), mat.clone());
        Ok(mat)
    }

    fn primitive(
        &mut self,
        mesh: &gltf::Mesh,
        prim: &gltf::Primitive,
    ) -> anyhow::Result<Arc<Mesh>> {
        let key = (mesh.index(), prim.index());
        if let Some(mesh) = self.meshes.get(&key) {
            return Ok(mesh.clone());
        }

        let prim_name = format!("{}_prim_{}", mesh_name(mesh), prim.index());
        let material = self.material(&prim.material())?;
        let result = load_primitive(&self.buffers, prim, material, self.kd_tree)
            .context(format!("primitive '{}'", prim_name))?;
        let result = Arc::new(result);
        self.meshes.insert(key, result.clone());
        Ok(result)
    }
}

fn parse_nodes(
    ctx: &mut LoadContext,
    graph: &mut SceneGraph,
    found: &mut FoundEntities,
    node: &gltf::Node,
    parent: Option<EntityId>,
) -> anyhow::Result<()> {
    let name = if let Some(camera) = node.camera() {
        camera.name().map(str::to_owned)
    } else if let Some(light) = node.light() {
        light.name().map(str::to_owned)
    } else {
        None
    }
    .or_else(|| node.name().map(str::to_owned))
    .unwrap_or_else(|| format!("node_{}", node.index()));

    let (translation, rotation, scale) = node.transform().decomposed();
    let local = Transform::from_trs(
        translation.into(),
        glam::Quat::from_xyzw(rotation[0], rotation[1], rotation[2], rotation[3]),
        scale.into(),
    );
    let id = graph.add_entity(&name, local, parent);

    if let Some(mesh) = node.mesh() {
        let mesh_key = mesh_name(&mesh);
        let mut model = Model::default();
        for prim in mesh.primitives() {
            if let Some(assignment) = ctx.assignment {
                if !assignment.owns(&mesh_key, prim.index()) {
                    continue;
                }
            }
            model.add_surface(ctx.primitive(&mesh, &prim)?);
        }
        if !model.surfaces().is_empty() {
            graph.entity_mut(id).model = Some(model);
        }
    }

    if let Some(camera) = node.camera() {
        if camera.index() == found.camera_index && found.camera.is_none() {
            graph.entity_mut(id).camera = Some(PerspectiveCamera::new(found.camera_fov).into());
            found.camera = Some(id);
        }
    }

    if let Some(light) = node.light() {
        if Some(light.index()) == found.sun_index && found.sun.is_none() {
            let energy = Color::from(light.color()) * light.intensity();
            graph.entity_mut(id).sun = Some(SunLight::new(energy));
            found.sun = Some(id);
        }
    }

    log::debug!("loaded: {}", name);

    for child in node.children() {
        parse_nodes(ctx, graph, found, &child, Some(id))?;
    }

    Ok(())
}

fn load_primitive(
    buffers: &[gltf::buffer::Data],
    prim: &gltf::Primitive,
    material: Arc<Material>,
    kd_tree: KdTreeConfig,
) -> anyhow::Result<Mesh> {
    if prim.mode() != gltf::mesh::Mode::Triangles {
        anyhow::bail!(format!("unsupported primitive mode {:?}", prim.mode()));
    }

    // positions
    let position_accessor = prim
        .get(&gltf::mesh::Semantic::Positions)
        .context("primitive doesn't have positions")?;
    let vertex_count = position_accessor.count();
    let mut vertices = vec![Vertex::default(); vertex_count];

    let positions = read_floats(&position_accessor, buffers, 3)?;
    for (v, p) in vertices.iter_mut().zip(positions.chunks_exact(3)) {
        v.position = glam::Vec3A::new(p[0], p[1], p[2]);
    }

    // indices
    let indices = match prim.indices() {
        Some(accessor) => read_indices(&accessor, buffers)?,
        None => (0..vertex_count as u32).collect(),
    };

    // texcoords
    if let Some(accessor) = prim.get(&gltf::mesh::Semantic::TexCoords(0)) {
        let data = read_attribute(&accessor, buffers, vertex_count, 2)?;
        for (v, uv) in vertices.iter_mut().zip(data.chunks_exact(2)) {
            v.uv = glam::Vec2::new(uv[0], uv[1]);
        }
    }

    // normals
    if let Some(accessor) = prim.get(&gltf::mesh::Semantic::Normals) {
        let data = read_attribute(&accessor, buffers, vertex_count, 3)?;
        for (v, n) in vertices.iter_mut().zip(data.chunks_exact(3)) {
            v.normal = glam::Vec3A::new(n[0], n[1], n[2]);
        }
    } else {
        compute_normals(&mut vertices, &indices);
    }

    // tangents, stored as vec4 with the handedness in w
    if let Some(accessor) = prim.get(&gltf::mesh::Semantic::Tangents) {
        let data = read_attribute(&accessor, buffers, vertex_count, 4)?;
        for (v, t) in vertices.iter_mut().zip(data.chunks_exact(4)) {
            v.tangent = glam::Vec3A::new(t[0], t[1], t[2]);
        }
    } else {
        compute_tangents(&mut vertices, &indices);
    }

    Mesh::new(vertices, &indices, material, kd_tree)
}

fn read_attribute(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
    vertex_count: usize,
    components: usize,
) -> anyhow::Result<Vec<f32>> {
    if accessor.count() != vertex_count {
        anyhow::bail!(format!(
            "attribute has {} elements but there are {} positions",
            accessor.count(),
            vertex_count
        ));
    }
    read_floats(accessor, buffers, components)
}

fn read_floats(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
    components: usize,
) -> anyhow::Result<Vec<f32>> {
    if accessor.data_type() != gltf::accessor::DataType::F32 {
        anyhow::bail!(format!(
            "accessor {} should hold floats, found {:?}",
            accessor.index(),
            accessor.data_type()
        ));
    }
    let mut result = Vec::with_capacity(accessor.count() * components);
    for element in accessor_elements(accessor, buffers)? {
        let values = element.as_slice_of::<f32>()?;
        if values.len() < components {
            anyhow::bail!(format!(
                "accessor {} has {} components, expect {}",
                accessor.index(),
                values.len(),
                components
            ));
        }
        result.extend_from_slice(&values[..components]);
    }
    Ok(result)
}

fn read_indices(
    accessor: &gltf::Accessor,
    buffers: &[gltf::buffer::Data],
) -> anyhow::Result<Vec<u32>> {
    let elements = accessor_elements(accessor, buffers)?;
    let mut indices = Vec::with_capacity(elements.len());
    for element in elements {
        let index = match accessor.data_type() {
            gltf::accessor::DataType::U8 => element[0] as u32,
            gltf::accessor::DataType::U16 => element.as_slice_of::<u16>()?[0] as u32,
            gltf::accessor::DataType::U32 => element.as_slice_of::<u32>()?[0],
            data_type => anyhow::bail!(format!("unsupported index type {:?}", data_type)),
        };
        indices.push(index);
    }
    Ok(indices)
}

/// One byte slice per element, honoring the buffer view's stride.
fn accessor_elements<'a>(
    accessor: &gltf::Accessor,
    buffers: &'a [gltf::buffer::Data],
) -> anyhow::Result<Vec<&'a [u8]>> {
    let buffer_view = accessor.view().context("accessor has no buffer view")?;
    let buffer_data: &[u8] = &buffers
        .get(buffer_view.buffer().index())
        .context("buffer is not loaded")?
        .0;

    let element_size = accessor.size();
    let stride = buffer_view.stride().unwrap_or(element_size);
    let start = buffer_view.offset() + accessor.offset();
    let count = accessor.count();
    if count > 0 {
        let end = start + stride * (count - 1) + element_size;
        if end > buffer_view.offset() + buffer_view.length() || end > buffer_data.len() {
            anyhow::bail!(format!(
                "accessor {} reads past its buffer view",
                accessor.index()
            ));
        }
    }

    Ok((0..count)
        .map(|i| {
            let offset = start + i * stride;
            &buffer_data[offset..offset + element_size]
        })
        .collect())
}

fn image_to_texture(
    index: usize,
    image: &gltf::image::Data,
    srgb: bool,
) -> anyhow::Result<ImageTex> {
    let width = image.width;
    let height = image.height;
    let channels = match image.format {
        gltf::image::Format::R8 => 1,
        gltf::image::Format::R8G8 => 2,
        gltf::image::Format::R8G8B8 => 3,
        gltf::image::Format::R8G8B8A8 => 4,
        gltf::image::Format::B8G8R8 => {
            let buffer = image::ImageBuffer::from_vec(width, height, image.pixels.clone())
                .context(format!(
                    "Failed to convert image {} (format is B8G8R8) to image::DynamicImage",
                    index
                ))?;
            return ImageTex::from_dynamic_image(image::DynamicImage::ImageBgr8(buffer), srgb);
        }
        gltf::image::Format::B8G8R8A8 => {
            let buffer = image::ImageBuffer::from_vec(width, height, image.pixels.clone())
                .context(format!(
                    "Failed to convert image {} (format is B8G8R8A8) to image::DynamicImage",
                    index
                ))?;
            return ImageTex::from_dynamic_image(image::DynamicImage::ImageBgra8(buffer), srgb);
        }
        _ => anyhow::bail!(format!(
            "Failed to convert image {}, 16-bit image is currently not supported",
            index
        )),
    };
    ImageTex::from_raw(width, height, channels, &image.pixels, srgb)
        .context(format!("image {}", index))
}
