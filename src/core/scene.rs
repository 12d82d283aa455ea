use std::sync::Arc;

use crate::{
    camera::{Camera, CameraT},
    core::{
        color::Color,
        coord::Coordinate,
        entity::{EntityId, SceneGraph},
        kd_tree::KdHitPayload,
        material::Material,
        model::ModelHit,
        ray::Ray,
        transform::Transform,
    },
    light::{EnvLight, SunLight},
};

/// World-space surface data reconstructed at the nearest hit.
pub struct Intersection {
    pub distance: f32,
    pub position: glam::Vec3A,
    pub uv: glam::Vec2,
    pub normal: glam::Vec3A,
    pub tangent: glam::Vec3A,
    pub material: Arc<Material>,
}

impl Intersection {
    /// Geometric frame perturbed by the material's normal map.
    pub fn shading_normal(&self) -> glam::Vec3A {
        let local = self.material.normal(self.uv).normalize_or_zero();
        let frame = Coordinate::from_tangent_normal(self.tangent, self.normal);
        let normal = frame.to_world(local).normalize_or_zero();
        if normal == glam::Vec3A::ZERO {
            self.normal
        } else {
            normal
        }
    }
}

struct NearestHit<'a> {
    entity: EntityId,
    hit: ModelHit<'a>,
}

pub struct Scene {
    graph: SceneGraph,
    camera: Camera,
    camera_entity: EntityId,
    sun: Option<(EntityId, SunLight)>,
    environment: EnvLight,
}

impl Scene {
    /// `camera_entity` must carry a camera component. A `sun_entity` without a sun
    /// component is dropped with a warning.
    pub fn new(
        mut graph: SceneGraph,
        camera_entity: EntityId,
        sun_entity: Option<EntityId>,
        environment: EnvLight,
    ) -> anyhow::Result<Self> {
        if camera_entity.index() >= graph.len() {
            anyhow::bail!(format!("camera entity {} doesn't exist", camera_entity.index()));
        }
        let camera = match graph.entity_mut(camera_entity).camera.take() {
            Some(camera) => camera,
            None => anyhow::bail!(format!(
                "entity '{}' has no camera",
                graph.entity(camera_entity).name
            )),
        };

        let sun = sun_entity.and_then(|id| {
            let sun = if id.index() < graph.len() {
                graph.entity(id).sun
            } else {
                None
            };
            if sun.is_none() {
                log::warn!("sun entity {} has no sun light, direct lighting is disabled", id.index());
            }
            sun.map(|sun| (id, sun))
        });

        graph.refresh_world_transforms();
        Ok(Self {
            graph,
            camera,
            camera_entity,
            sun,
            environment,
        })
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn environment(&self) -> &EnvLight {
        &self.environment
    }

    pub fn camera_ray(&self, ndc: glam::Vec2, aspect: f32) -> Ray {
        let world = self.graph.world_transform(self.camera_entity);
        self.camera.generate_ray(ndc, aspect, &world)
    }

    pub fn sun(&self) -> Option<(&SunLight, Transform)> {
        self.sun
            .as_ref()
            .map(|(id, sun)| (sun, self.graph.world_transform(*id)))
    }

    fn nearest_hit(&self, ray: &Ray, visualize_depth: u32) -> Option<NearestHit<'_>> {
        let mut stack: Vec<EntityId> = self.graph.roots().to_vec();
        let mut nearest: Option<NearestHit<'_>> = None;

        while let Some(id) = stack.pop() {
            let entity = self.graph.entity(id);
            stack.extend_from_slice(entity.children());

            let model = match &entity.model {
                Some(model) => model,
                None => continue,
            };
            let world = self.graph.world_transform(id);
            let world_inverse = self.graph.world_inverse(id);
            if let Some(hit) = model.intersect(ray, &world, &world_inverse, visualize_depth) {
                if nearest
                    .as_ref()
                    .map_or(true, |best| hit.distance < best.hit.distance)
                {
                    nearest = Some(NearestHit { entity: id, hit });
                }
            }
        }

        nearest
    }

    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        let nearest = self.nearest_hit(ray, 0)?;
        let (index, barycentric) = match nearest.hit.payload {
            KdHitPayload::Triangle { index, barycentric } => (index, barycentric),
            KdHitPayload::DepthColor(_) => return None,
        };

        let mesh = nearest.hit.mesh;
        let vertex = mesh.surface_at(index, barycentric);
        let world = self.graph.world_transform(nearest.entity);

        Some(Intersection {
            distance: nearest.hit.distance,
            position: world.transform_point(vertex.position),
            uv: vertex.uv,
            normal: world.transform_normal(vertex.normal).normalize_or_zero(),
            tangent: world.transform_normal(vertex.tangent).normalize_or_zero(),
            material: mesh.material().clone(),
        })
    }

    /// Color of the kd-tree cell hit at `depth`. Rays that reach a leaf first show
    /// their barycentric coordinates.
    pub fn visualize_kd_tree(&self, ray: &Ray, depth: u32) -> Option<Color> {
        let nearest = self.nearest_hit(ray, depth)?;
        Some(match nearest.hit.payload {
            KdHitPayload::DepthColor(color) => color,
            KdHitPayload::Triangle { barycentric, .. } => Color::from(barycentric),
        })
    }

    pub fn occluded(&self, ray: &Ray) -> bool {
        self.nearest_hit(ray, 0).is_some()
    }
}
