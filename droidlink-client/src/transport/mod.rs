mod ack;
mod channel;
mod config;
mod events;
mod monitor;
mod stats;
mod tcp;
mod thread;
mod udp;
pub mod usb;

pub use ack::*;
pub(crate) use channel::*;
pub use config::*;
pub use events::*;
pub use monitor::*;
pub use stats::*;
pub use tcp::*;
pub(crate) use thread::*;
pub use udp::*;
