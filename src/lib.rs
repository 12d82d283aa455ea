pub mod bxdf;
pub mod camera;
pub mod core;
pub mod distributed;
pub mod light;
pub mod loader;
pub mod renderer;
pub mod storage;
pub mod texture;
