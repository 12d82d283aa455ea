use crate::{
    core::{color::Color, ray::Ray},
    renderer::{ShadeState, SurfacePoint},
};

/// One camera sample of one pixel. Unique among the rays in flight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RayId {
    pub x: u32,
    pub y: u32,
    pub sample: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RayStage {
    Initial,
    Intersect,
    IntersectReduce,
    Shading,
    ShadowIntersect,
    ShadowReduce,
    Lighting,
    Completed,
}

/// Nearest surface a partition found for a ray.
#[derive(Copy, Clone, Debug)]
pub struct SurfaceHit {
    pub distance: f32,
    pub point: SurfacePoint,
}

/// A path in flight. The record is copied between stages, never shared.
#[derive(Copy, Clone, Debug)]
pub struct RayRecord {
    pub id: RayId,
    pub stage: RayStage,
    pub ray: Ray,
    /// Remaining bounces.
    pub bounce: u32,
    pub throughput: Color,
    pub radiance: Color,
    pub alpha: f32,
    pub hit: Option<SurfaceHit>,
    pub shade: Option<ShadeState>,
    pub sun_visible: Option<bool>,
}

impl RayRecord {
    pub fn camera(id: RayId, ray: Ray, bounce_count: u32) -> Self {
        Self {
            id,
            stage: RayStage::Initial,
            ray,
            bounce: bounce_count,
            throughput: Color::WHITE,
            radiance: Color::BLACK,
            alpha: 1.0,
            hit: None,
            shade: None,
            sun_visible: None,
        }
    }

    /// Starts a new segment along `ray`, dropping per-hit state.
    pub fn continue_along(&mut self, ray: Ray, stage: RayStage) {
        self.ray = ray;
        self.stage = stage;
        self.hit = None;
        self.shade = None;
        self.sun_visible = None;
    }

    pub fn complete(&mut self) {
        self.stage = RayStage::Completed;
    }

    pub fn hit_distance(&self) -> Option<f32> {
        self.hit.map(|hit| hit.distance)
    }
}

/// Keeps the report with the closer hit. A hit beats no hit.
pub fn nearest_report(a: RayRecord, b: RayRecord) -> RayRecord {
    match (a.hit_distance(), b.hit_distance()) {
        (Some(da), Some(db)) => {
            if db < da {
                b
            } else {
                a
            }
        }
        (None, Some(_)) => b,
        _ => a,
    }
}

/// The sun is visible only when no partition saw an occluder.
pub fn shadow_report(mut a: RayRecord, b: RayRecord) -> RayRecord {
    a.sun_visible = match (a.sun_visible, b.sun_visible) {
        (Some(va), Some(vb)) => Some(va && vb),
        (va, vb) => va.or(vb),
    };
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(distance: Option<f32>) -> RayRecord {
        let id = RayId {
            x: 1,
            y: 2,
            sample: 0,
        };
        let mut record = RayRecord::camera(id, Ray::new(glam::Vec3A::ZERO, glam::Vec3A::Z), 4);
        record.hit = distance.map(|distance| SurfaceHit {
            distance,
            point: SurfacePoint {
                position: glam::Vec3A::Z * distance,
                normal: -glam::Vec3A::Z,
                albedo: Color::WHITE,
                opacity: 1.0,
                roughness: 1.0,
                metallic: 0.0,
                emissive: Color::BLACK,
                ior: 1.33,
                shadow_catcher: false,
            },
        });
        record
    }

    #[test]
    fn test_nearest_report_wins_in_any_order() {
        let near = report(Some(1.0));
        let far = report(Some(3.0));
        let miss = report(None);
        assert_eq!(nearest_report(near, far).hit_distance(), Some(1.0));
        assert_eq!(nearest_report(far, near).hit_distance(), Some(1.0));
        assert_eq!(nearest_report(miss, far).hit_distance(), Some(3.0));
        assert_eq!(nearest_report(far, miss).hit_distance(), Some(3.0));
        assert_eq!(nearest_report(miss, miss).hit_distance(), None);
    }

    #[test]
    fn test_any_occluder_shadows() {
        let mut lit = report(Some(1.0));
        lit.sun_visible = Some(true);
        let mut blocked = lit;
        blocked.sun_visible = Some(false);
        assert_eq!(shadow_report(lit, lit).sun_visible, Some(true));
        assert_eq!(shadow_report(lit, blocked).sun_visible, Some(false));
        assert_eq!(shadow_report(blocked, lit).sun_visible, Some(false));
    }
}
