mod environment;
mod sun;

pub use environment::*;
pub use sun::*;
