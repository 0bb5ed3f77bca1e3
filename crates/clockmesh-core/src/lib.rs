//! clockmesh Core - Fundamental types and primitives
//!
//! This crate defines the types shared by every machine component:
//! - Identifiers (PeerId)
//! - Logical time (LogicalTime) and tick rate (TickRate)
//! - The inbound queue shared by the receiver and the clock engine
//! - The common error type

pub mod error;
pub mod id;
pub mod queue;
pub mod rate;
pub mod time;

pub use error::*;
pub use id::*;
pub use queue::*;
pub use rate::*;
pub use time::*;
