//! clockmesh Time Engine - logical clock and cycle control
//!
//! This crate implements the per-machine decision loop:
//! - Lamport clock with local and receive rules
//! - Clock Engine: one decision per cycle (receive, send, broadcast, internal)
//! - Pacer: keeps cycles at the machine's tick rate

pub mod clock;
pub mod engine;
pub mod pacer;

pub use clock::*;
pub use engine::*;
pub use pacer::*;
