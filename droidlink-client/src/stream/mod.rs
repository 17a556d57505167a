mod annexb;
mod config;
mod depacketizer;
mod nal;
mod reassembler;
mod rtp;
mod vid0;

pub use annexb::*;
pub use config::*;
pub use depacketizer::*;
pub use nal::*;
pub use reassembler::*;
pub use rtp::*;
pub use vid0::*;
