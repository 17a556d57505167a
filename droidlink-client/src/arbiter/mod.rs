mod active;
mod config;
mod hybrid;
mod monitor;

pub use active::*;
pub use config::*;
pub use hybrid::*;
pub use monitor::*;
