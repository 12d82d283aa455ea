mod gltf;
mod settings;

pub use self::gltf::{fetch_scene, load_scene, mesh_name};
pub use settings::*;
