use std::sync::Arc;

use crate::core::{
    aabb::Aabb,
    kd_tree::KdHitPayload,
    mesh::Mesh,
    ray::Ray,
    transform::Transform,
};

/// Mesh surfaces placed by one entity. Each mesh carries its own material.
#[derive(Default)]
pub struct Model {
    surfaces: Vec<Arc<Mesh>>,
    aabb: Aabb,
}

pub struct ModelHit<'a> {
    /// World-space distance along the world ray.
    pub distance: f32,
    pub mesh: &'a Mesh,
    pub payload: KdHitPayload,
}

impl Model {
    pub fn new(surfaces: Vec<Arc<Mesh>>) -> Self {
        let mut model = Self {
            surfaces,
            aabb: Aabb::empty(),
        };
        model.recalculate_aabb();
        model
    }

    pub fn add_surface(&mut self, mesh: Arc<Mesh>) {
        self.aabb.add_aabb(mesh.aabb());
        self.surfaces.push(mesh);
    }

    pub fn surfaces(&self) -> &[Arc<Mesh>] {
        &self.surfaces
    }

    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    pub fn recalculate_aabb(&mut self) {
        self.aabb.clear();
        for mesh in &self.surfaces {
            self.aabb.add_aabb(mesh.aabb());
        }
    }

    /// Nearest hit of `ray` given the model's world transform and its inverse.
    pub fn intersect(
        &self,
        ray: &Ray,
        world: &Transform,
        world_inverse: &Transform,
        visualize_depth: u32,
    ) -> Option<ModelHit<'_>> {
        let local_ray = ray.transformed_by(world_inverse);
        match self.aabb.intersect(&local_ray) {
            Some(hit) if hit.has_hit() => {}
            _ => return None,
        }

        let mut nearest: Option<ModelHit<'_>> = None;
        for mesh in &self.surfaces {
            if let Some(hit) = mesh.intersect(&local_ray, visualize_depth) {
                let local_offset = local_ray.direction() * hit.distance;
                let distance = world.transform_vector(local_offset).length();
                if nearest.as_ref().map_or(true, |best| distance < best.distance) {
                    nearest = Some(ModelHit {
                        distance,
                        mesh,
                        payload: hit.payload,
                    });
                }
            }
        }
        nearest
    }
}
