mod bit_reader;
mod config;
mod error;
mod parameter_sets;
mod pps;
mod slice;
mod sps;
mod validator;

pub use bit_reader::*;
pub use config::*;
pub use error::*;
pub use parameter_sets::*;
pub use pps::*;
pub use slice::*;
pub use sps::*;
pub use validator::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
