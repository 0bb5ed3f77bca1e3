//! Error types for clockmesh machines

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::PeerId;

/// Core clockmesh errors
#[derive(Error, Debug)]
pub enum ClockError {
    // Startup errors
    #[error("Failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to connect to peer {peer} after {attempts} attempts: {source}")]
    PeerConnect {
        peer: PeerId,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    // Wire errors
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Bad frame length: expected {expected}, got {actual}")]
    FrameLength { expected: usize, actual: usize },

    // Link errors
    #[error("Link to peer {0} is down")]
    LinkDown(PeerId),

    #[error("Unknown peer: {0}")]
    UnknownPeer(PeerId),

    // Event log errors
    #[error("Event log write failed: {0}")]
    Logging(#[source] io::Error),

    // Configuration errors
    #[error(
        "Tick rate {0} outside {min}..={max}",
        min = crate::TickRate::MIN,
        max = crate::TickRate::MAX
    )]
    InvalidTickRate(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Lifecycle errors
    #[error("Clock loop of machine {0} has stopped")]
    ClockStopped(PeerId),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for clockmesh operations
pub type ClockResult<T> = Result<T, ClockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_rate_message_names_range() {
        let msg = ClockError::InvalidTickRate(9).to_string();
        assert_eq!(msg, "Tick rate 9 outside 1..=6");
    }

    #[test]
    fn test_clock_stopped_names_machine() {
        let peer = PeerId::new("127.0.0.1:11113".parse().unwrap());
        assert_eq!(
            ClockError::ClockStopped(peer).to_string(),
            "Clock loop of machine 127.0.0.1:11113 has stopped"
        );
    }
}
