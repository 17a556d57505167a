mod command;
mod header;
mod packet;
mod seq_number;

pub use command::*;
pub use header::*;
pub use packet::*;
pub use seq_number::*;
