//! clockmesh Transport Layer - TCP links between machines
//!
//! This crate provides:
//! - Inbound receiver: one readiness wait over the listener and all peer connections
//! - Outbound links: one connection per peer, opened at startup with bounded retry

pub mod links;
pub mod receiver;

pub use links::*;
pub use receiver::*;
