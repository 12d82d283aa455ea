mod assignment;
mod partition;
mod pipeline;
mod record;
mod reduction;

pub use assignment::*;
pub use partition::*;
pub use pipeline::*;
pub use record::*;
pub use reduction::*;
