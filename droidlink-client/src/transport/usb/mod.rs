mod aoa;
mod backend;
mod config;
mod discovery;
mod transport;

pub use aoa::*;
pub use backend::*;
pub use config::*;
pub use discovery::*;
pub use transport::*;

cfg_if::cfg_if! {
    if #[cfg(feature = "usb")] {
        mod rusb_backend;
        pub use rusb_backend::*;
    }
}

#[cfg(test)]
pub(crate) mod mock;
