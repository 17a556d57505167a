mod backend;
mod config;
mod dpb;
mod error;
mod marking;
mod poc;
mod queue;
mod reorder;
mod session;
mod worker;

pub use backend::*;
pub use config::*;
pub use dpb::*;
pub use error::*;
pub use marking::*;
pub use poc::*;
pub use queue::*;
pub use reorder::*;
pub use session::*;
pub use worker::*;
