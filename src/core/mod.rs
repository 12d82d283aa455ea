pub mod aabb;
pub mod color;
pub mod coord;
pub mod entity;
pub mod film;
pub mod kd_tree;
pub mod loader;
pub mod material;
pub mod mesh;
pub mod model;
pub mod ray;
pub mod rng;
pub mod scene;
pub mod transform;
pub mod triangle;

/// Tolerance shared by intersection, ray offsetting and pdf floors.
pub const EPSILON: f32 = 1e-4;
