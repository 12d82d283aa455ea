use crate::{
    bxdf::{BxdfInputs, BxdfT, PbrSurface},
    core::{
        color::Color,
        ray::Ray,
        rng::Rng,
        scene::{Intersection, Scene},
        EPSILON,
    },
    loader::RenderSettings,
};

/// Emission from textures and factors is scaled by this before shading.
pub const EMISSIVE_INTENSITY: f32 = 10.0;

/// Result of tracing one path segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Contribution {
    Radiance { color: Color, alpha: f32 },
    /// The path ended without gathering light, e.g. a back-facing hit or a shadowed catcher.
    Terminated,
}

impl Contribution {
    pub fn color(&self) -> Color {
        match self {
            Contribution::Radiance { color, .. } => *color,
            Contribution::Terminated => Color::BLACK,
        }
    }

    /// Color and alpha written to the film. A terminated path is opaque black.
    pub fn composite(&self) -> (Color, f32) {
        match self {
            Contribution::Radiance { color, alpha } => (*color, *alpha),
            Contribution::Terminated => (Color::BLACK, 1.0),
        }
    }
}

/// Material inputs sampled at a hit, in world space.
#[derive(Copy, Clone, Debug)]
pub struct SurfacePoint {
    pub position: glam::Vec3A,
    /// Shading normal, normal map applied.
    pub normal: glam::Vec3A,
    pub albedo: Color,
    pub opacity: f32,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive: Color,
    pub ior: f32,
    pub shadow_catcher: bool,
}

impl SurfacePoint {
    pub fn from_intersection(inter: &Intersection) -> Self {
        let material = &inter.material;
        Self {
            position: inter.position,
            normal: inter.shading_normal(),
            albedo: material.albedo(inter.uv),
            opacity: material.opacity(inter.uv),
            roughness: material.roughness(inter.uv),
            metallic: material.metallic(inter.uv),
            emissive: material.emissive(inter.uv) * EMISSIVE_INTENSITY,
            ior: material.ior,
            shadow_catcher: material.shadow_catcher,
        }
    }

    pub fn surface(&self) -> PbrSurface {
        PbrSurface::new(self.albedo, self.roughness, self.metallic, self.ior)
    }

    /// Continues `ray` on the far side of this point without changing direction.
    pub fn pass_through(&self, ray: &Ray) -> Ray {
        Ray::new(self.position + ray.direction() * EPSILON, ray.direction())
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SunSample {
    pub ray: Ray,
    pub energy: Color,
}

/// Per-hit decisions made before any shadow test.
#[derive(Copy, Clone, Debug)]
pub struct ShadeState {
    pub wo: glam::Vec3A,
    pub specular_probability: f32,
    pub specular: bool,
    /// Present when a sun exists and the sampled direction is above the surface.
    pub sun: Option<SunSample>,
}

pub enum SurfaceEvent {
    PassThrough(Ray),
    Terminated,
    Shade(ShadeState),
}

pub enum DirectOutcome {
    PassThrough,
    Terminated,
    Lit(Color),
}

#[derive(Copy, Clone, Debug)]
pub struct IndirectSample {
    pub ray: Ray,
    pub brdf: Color,
    pub pdf: f32,
}

/// Path integration against one scene: sun light, one importance-sampled
/// bounce per hit, and emission.
pub struct Integrator<'a> {
    scene: &'a Scene,
    bounce_count: u32,
    transparent_background: bool,
    visualize_kd_tree_depth: u32,
}

impl<'a> Integrator<'a> {
    pub fn new(scene: &'a Scene, settings: &RenderSettings) -> Self {
        Self {
            scene,
            bounce_count: settings.bounce_count,
            transparent_background: settings.transparent_background,
            visualize_kd_tree_depth: settings.visualize_kd_tree_depth,
        }
    }

    pub fn scene(&self) -> &Scene {
        self.scene
    }

    pub fn bounce_count(&self) -> u32 {
        self.bounce_count
    }

    /// Environment seen along a ray that leaves the scene.
    pub fn miss(&self, ray: &Ray) -> Contribution {
        Contribution::Radiance {
            color: self.scene.environment().radiance(ray.direction()),
            alpha: self.background_alpha(),
        }
    }

    pub fn background_alpha(&self) -> f32 {
        if self.transparent_background {
            0.0
        } else {
            1.0
        }
    }

    /// Opacity skip, back-facing rejection, lobe choice and sun sampling.
    pub fn surface_event(&self, point: &SurfacePoint, ray: &Ray, rng: &mut Rng) -> SurfaceEvent {
        if (point.opacity - 1.0).abs() > f32::EPSILON && rng.uniform_1d() > point.opacity {
            return SurfaceEvent::PassThrough(point.pass_through(ray));
        }

        let wo = -ray.direction();
        // smooth shading can put the viewer below the shading normal
        if point.normal.dot(wo) <= 0.0 {
            return SurfaceEvent::Terminated;
        }

        let inputs = BxdfInputs {
            normal: point.normal,
            wo,
        };
        let specular_probability = point.surface().specular_probability(&inputs);
        let specular = rng.uniform_1d() < specular_probability;

        let sun = self.scene.sun().and_then(|(sun, world)| {
            let dir = sun.sample_direction(&world, rng);
            if point.normal.dot(dir) > 0.0 {
                Some(SunSample {
                    ray: Ray::new(point.position + dir * EPSILON, dir),
                    energy: sun.energy,
                })
            } else {
                None
            }
        });

        SurfaceEvent::Shade(ShadeState {
            wo,
            specular_probability,
            specular,
            sun,
        })
    }

    /// Direct sun term once visibility of `state.sun` is known. `sun_visible` is
    /// `None` when no shadow ray was cast.
    pub fn resolve_direct(
        &self,
        point: &SurfacePoint,
        state: &ShadeState,
        sun_visible: Option<bool>,
        bounce: u32,
    ) -> DirectOutcome {
        let sun = match (state.sun, sun_visible) {
            (Some(sun), Some(visible)) => (sun, visible),
            _ => return DirectOutcome::Lit(Color::BLACK),
        };
        let first_bounce = bounce == self.bounce_count;

        match sun {
            (_, false) if point.shadow_catcher && first_bounce => DirectOutcome::Terminated,
            (_, false) => DirectOutcome::Lit(Color::BLACK),
            (_, true) if point.shadow_catcher && first_bounce => DirectOutcome::PassThrough,
            (sun, true) => {
                let inputs = BxdfInputs {
                    normal: point.normal,
                    wo: state.wo,
                };
                let eval = point.surface().eval(&inputs, sun.ray.direction());
                // sampled from the light itself, the pdf is 1
                let direct = eval.brdf * sun.energy;
                DirectOutcome::Lit(direct.clamp(Color::BLACK, sun.energy))
            }
        }
    }

    /// Importance-sampled continuation. `None` when the sample falls below the surface.
    pub fn sample_indirect(
        &self,
        point: &SurfacePoint,
        state: &ShadeState,
        rng: &mut Rng,
    ) -> Option<IndirectSample> {
        let surface = point.surface();
        let inputs = BxdfInputs {
            normal: point.normal,
            wo: state.wo,
        };
        let wi = surface.lobe(state.specular).sample(&inputs, rng.uniform_2d());
        if point.normal.dot(wi) <= 0.0 {
            return None;
        }

        let eval = surface.eval(&inputs, wi);
        Some(IndirectSample {
            ray: Ray::new(point.position + wi * EPSILON, wi),
            brdf: eval.brdf,
            pdf: eval.pdf(state.specular_probability),
        })
    }

    /// `brdf / pdf` clamped so a bounce never returns more than it received.
    /// A NaN weight is logged and treated as zero.
    pub fn indirect_weight(
        &self,
        point: &SurfacePoint,
        state: &ShadeState,
        sample: &IndirectSample,
        incoming: Color,
        bounce: u32,
    ) -> Color {
        let weight = sample.brdf / sample.pdf.max(EPSILON);
        if weight.has_nan() {
            log::warn!(
                "NaN indirect weight at position: {:?} outgoing: {:?} incoming: {:?} brdf: {:?} pdf: {} radiance: {:?} bounce: {}",
                point.position,
                state.wo,
                sample.ray.direction(),
                sample.brdf,
                sample.pdf,
                incoming,
                bounce
            );
            return Color::BLACK;
        }
        weight.saturate()
    }

    /// Full sample for a camera ray, kd-tree visualization included.
    pub fn trace_camera_ray(&self, ray: &Ray, rng: &mut Rng) -> Contribution {
        if self.visualize_kd_tree_depth != 0 {
            return match self.scene.visualize_kd_tree(ray, self.visualize_kd_tree_depth) {
                Some(color) => Contribution::Radiance { color, alpha: 1.0 },
                None => self.miss(ray),
            };
        }
        self.trace(ray, self.bounce_count, rng)
    }

    pub fn trace(&self, ray: &Ray, bounce: u32, rng: &mut Rng) -> Contribution {
        if bounce == 0 {
            return Contribution::Terminated;
        }

        let inter = match self.scene.intersect(ray) {
            Some(inter) => inter,
            None => return self.miss(ray),
        };
        let point = SurfacePoint::from_intersection(&inter);

        let state = match self.surface_event(&point, ray, rng) {
            SurfaceEvent::PassThrough(next) => return self.trace(&next, bounce, rng),
            SurfaceEvent::Terminated => return Contribution::Terminated,
            SurfaceEvent::Shade(state) => state,
        };

        let sun_visible = state.sun.map(|sun| !self.scene.occluded(&sun.ray));
        let direct = match self.resolve_direct(&point, &state, sun_visible, bounce) {
            DirectOutcome::PassThrough => {
                return self.trace(&point.pass_through(ray), bounce, rng)
            }
            DirectOutcome::Terminated => return Contribution::Terminated,
            DirectOutcome::Lit(direct) => direct,
        };

        let indirect = match self.sample_indirect(&point, &state, rng) {
            Some(sample) => {
                let incoming = self.trace(&sample.ray, bounce - 1, rng).color();
                incoming * self.indirect_weight(&point, &state, &sample, incoming, bounce)
            }
            None => Color::BLACK,
        };

        Contribution::Radiance {
            color: direct + indirect + point.emissive,
            alpha: 1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        camera::PerspectiveCamera,
        core::{
            entity::SceneGraph,
            kd_tree::KdTreeConfig,
            material::Material,
            mesh::{Mesh, Vertex},
            model::Model,
            transform::Transform,
        },
        light::{EnvLight, SunLight},
    };

    fn quad(material: Material, z: f32) -> Mesh {
        let vertices = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)]
            .iter()
            .map(|&(x, y)| Vertex {
                position: glam::Vec3A::new(x, y, z),
                ..Default::default()
            })
            .collect();
        Mesh::new(
            vertices,
            &[0, 1, 2, 0, 2, 3],
            Arc::new(material),
            KdTreeConfig::default(),
        )
        .unwrap()
    }

    fn matte() -> Material {
        Material {
            albedo_factor: Color::gray(0.8),
            metallic_factor: 0.0,
            emissive_factor: Color::BLACK,
            ..Default::default()
        }
    }

    /// Camera at the origin looking down -Z, an optional quad facing it, and a sun
    /// behind the camera shining along -Z.
    fn build_scene(mesh: Option<Mesh>, with_sun: bool) -> Scene {
        let mut graph = SceneGraph::new();
        let camera = graph.add_entity("camera", Transform::IDENTITY, None);
        graph.entity_mut(camera).camera = Some(PerspectiveCamera::new(0.8).into());
        if let Some(mesh) = mesh {
            let id = graph.add_entity("quad", Transform::IDENTITY, None);
            graph.entity_mut(id).model = Some(Model::new(vec![Arc::new(mesh)]));
        }
        let sun = if with_sun {
            let id = graph.add_entity("sun", Transform::IDENTITY, None);
            graph.entity_mut(id).sun = Some(SunLight::default());
            Some(id)
        } else {
            None
        };
        Scene::new(graph, camera, sun, EnvLight::uniform(Color::gray(0.5))).unwrap()
    }

    fn settings(bounce_count: u32, transparent_background: bool) -> RenderSettings {
        RenderSettings {
            bounce_count,
            transparent_background,
            ..Default::default()
        }
    }

    #[test]
    fn test_miss_returns_environment_with_background_alpha() {
        let scene = build_scene(None, false);
        let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
        let mut rng = Rng::with_seed(1);

        let opaque = Integrator::new(&scene, &settings(4, false));
        assert_eq!(
            opaque.trace(&ray, 4, &mut rng),
            Contribution::Radiance {
                color: Color::gray(0.5),
                alpha: 1.0
            }
        );
        let transparent = Integrator::new(&scene, &settings(4, true));
        assert_eq!(transparent.trace(&ray, 4, &mut rng).composite().1, 0.0);
    }

    #[test]
    fn test_no_bounces_left_terminates() {
        let scene = build_scene(None, false);
        let integrator = Integrator::new(&scene, &settings(0, false));
        let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
        let result = integrator.trace(&ray, 0, &mut Rng::with_seed(2));
        assert_eq!(result, Contribution::Terminated);
        assert_eq!(result.composite(), (Color::BLACK, 1.0));
    }

    #[test]
    fn test_back_facing_hit_terminates() {
        // vertex normals point +Z, the ray arrives from below
        let scene = build_scene(Some(quad(matte(), 0.0)), false);
        let integrator = Integrator::new(&scene, &settings(4, false));
        let ray = Ray::new(glam::Vec3A::new(0.0, 0.0, -3.0), glam::Vec3A::Z);
        assert_eq!(
            integrator.trace(&ray, 4, &mut Rng::with_seed(3)),
            Contribution::Terminated
        );
    }

    #[test]
    fn test_emission_is_boosted() {
        let glow = Material {
            albedo_factor: Color::BLACK,
            metallic_factor: 0.0,
            emissive_factor: Color::gray(0.1),
            ..Default::default()
        };
        let scene = build_scene(Some(quad(glow, -2.0)), false);
        let integrator = Integrator::new(&scene, &settings(1, false));
        let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
        let (color, alpha) = integrator.trace(&ray, 1, &mut Rng::with_seed(4)).composite();
        assert!((color.r - 1.0).abs() < 1e-4);
        assert_eq!(alpha, 1.0);
    }

    #[test]
    fn test_indirect_never_exceeds_environment() {
        let scene = build_scene(Some(quad(matte(), -2.0)), false);
        let integrator = Integrator::new(&scene, &settings(2, false));
        let mut rng = Rng::with_seed(5);
        for _ in 0..256 {
            let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
            let color = integrator.trace(&ray, 2, &mut rng).color();
            assert!(color.is_finite());
            assert!(color.max_component() <= 0.5 + 1e-4);
            assert!(color.r >= 0.0);
        }
    }

    fn random_point(rng: &mut Rng) -> SurfacePoint {
        SurfacePoint {
            position: glam::Vec3A::ZERO,
            normal: glam::Vec3A::Y,
            albedo: Color::new(rng.uniform_1d(), rng.uniform_1d(), rng.uniform_1d()),
            opacity: 1.0,
            roughness: rng.uniform_1d(),
            metallic: rng.uniform_1d(),
            emissive: Color::BLACK,
            ior: rng.uniform_range(1.0, 2.5),
            shadow_catcher: false,
        }
    }

    #[test]
    fn test_weighted_radiance_never_exceeds_incoming() {
        let scene = build_scene(None, false);
        let integrator = Integrator::new(&scene, &settings(4, false));
        let mut rng = Rng::with_seed(21);
        let mut checked = 0;
        for _ in 0..2000 {
            let point = random_point(&mut rng);
            let wo = rng.uniform_on_sphere();
            let ray = Ray::new(point.position + wo, -wo);
            let state = match integrator.surface_event(&point, &ray, &mut rng) {
                SurfaceEvent::Shade(state) => state,
                _ => continue,
            };
            let sample = match integrator.sample_indirect(&point, &state, &mut rng) {
                Some(sample) => sample,
                None => continue,
            };
            let incoming = Color::new(
                rng.uniform_range(0.0, 20.0),
                rng.uniform_range(0.0, 20.0),
                rng.uniform_range(0.0, 20.0),
            );
            let out = incoming * integrator.indirect_weight(&point, &state, &sample, incoming, 4);
            assert!(out.r <= incoming.r && out.g <= incoming.g && out.b <= incoming.b);
            assert!(out.r >= 0.0 && out.g >= 0.0 && out.b >= 0.0);
            checked += 1;
        }
        assert!(checked > 200);
    }

    #[test]
    fn test_nan_weight_contributes_nothing() {
        let scene = build_scene(None, false);
        let integrator = Integrator::new(&scene, &settings(4, false));
        let point = random_point(&mut Rng::with_seed(22));
        let state = ShadeState {
            wo: glam::Vec3A::Y,
            specular_probability: 0.5,
            specular: false,
            sun: None,
        };
        let sample = IndirectSample {
            ray: Ray::new(glam::Vec3A::ZERO, glam::Vec3A::Y),
            brdf: Color::new(f32::NAN, 0.5, 0.5),
            pdf: 1.0,
        };
        let weight = integrator.indirect_weight(&point, &state, &sample, Color::WHITE, 4);
        assert_eq!(weight, Color::BLACK);
    }

    #[test]
    fn test_fully_transparent_surface_passes_through() {
        let clear = Material {
            opacity_factor: 0.0,
            ..matte()
        };
        let scene = build_scene(Some(quad(clear, -2.0)), false);
        let integrator = Integrator::new(&scene, &settings(4, true));
        let ray = Ray::new(glam::Vec3A::ZERO, -glam::Vec3A::Z);
        let result = integrator.trace(&ray, 4, &mut Rng::with_seed(6));
        assert_eq!(
            result,
            Contribution::Radiance {
                color: Color::gray(0.5),
                alpha: 0.0
            }
        );
    }

    #[test]
    fn test_lit_shadow_catcher_shows_background() {
        let catcher = Material {
            shadow_catcher: true,
            ..matte()
        };
        let scene = build_scene(Some(quad(catcher, -2.0)), true);
        let integrator = Integrator::new(&scene, &settings(4, true));
        let ray = Ray::new(glam::Vec3A::new(0.1, 0.1, 0.0), -glam::Vec3A::Z);
        let result = integrator.trace(&ray, 4, &mut Rng::with_seed(7));
        assert_eq!(result.composite().1, 0.0);
    }

    #[test]
    fn test_shadowed_catcher_terminates() {
        let catcher = Material {
            shadow_catcher: true,
            ..matte()
        };
        let mut graph = SceneGraph::new();
        let camera = graph.add_entity("camera", Transform::IDENTITY, None);
        graph.entity_mut(camera).camera = Some(PerspectiveCamera::new(0.8).into());
        let floor = graph.add_entity("floor", Transform::IDENTITY, None);
        graph.entity_mut(floor).model = Some(Model::new(vec![Arc::new(quad(catcher, -4.0))]));
        // behind the camera, between the floor and the sun
        let roof = graph.add_entity("roof", Transform::IDENTITY, None);
        graph.entity_mut(roof).model = Some(Model::new(vec![Arc::new(quad(matte(), 2.0))]));
        let sun = graph.add_entity("sun", Transform::IDENTITY, None);
        graph.entity_mut(sun).sun = Some(SunLight::default());
        let scene =
            Scene::new(graph, camera, Some(sun), EnvLight::uniform(Color::WHITE)).unwrap();

        let integrator = Integrator::new(&scene, &settings(4, true));
        let ray = Ray::new(glam::Vec3A::new(0.1, 0.1, 0.0), -glam::Vec3A::Z);
        assert_eq!(
            integrator.trace(&ray, 4, &mut Rng::with_seed(8)),
            Contribution::Terminated
        );
    }
}
