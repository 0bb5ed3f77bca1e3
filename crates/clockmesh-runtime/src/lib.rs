//! clockmesh Runtime - machine orchestration and main loop
//!
//! Each machine runs two concurrent tasks sharing one inbound queue:
//! 1. Receiver: readiness loop pushing received timestamps
//! 2. Clock loop, once per tick:
//!    - pop a timestamp and apply the receive rule, or
//!    - send / broadcast / internal event
//!    - write the event log
//!    - sleep out the rest of the tick
//!
//! `Cluster` binds every receiver before any machine opens outbound links.

pub mod cluster;
pub mod config;
pub mod logger;
pub mod machine;
pub mod telemetry;

pub use cluster::*;
pub use config::*;
pub use logger::*;
pub use machine::*;
pub use telemetry::*;
