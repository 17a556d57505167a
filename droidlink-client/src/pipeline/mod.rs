mod config;
mod idr;
mod router;
mod video;

pub use config::*;
pub use idr::*;
pub use router::*;
pub use video::*;
