//! clockmesh Wire Protocol - Binary frame format
//!
//! Every message is a single fixed-size frame:
//! - 4 bytes, big-endian u32
//! - the sender's logical clock at the instant of send
//! - no header, version, checksum or sequence number

pub mod frame;
pub mod reader;

pub use frame::*;
pub use reader::*;
