pub mod arbiter;
pub mod bitstream;
mod client;
mod config;
pub mod decoder;
pub mod pipeline;
pub mod stream;
pub mod transport;

pub use client::*;
pub use config::*;
