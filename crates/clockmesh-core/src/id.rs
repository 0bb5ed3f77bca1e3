//! Identity types for clockmesh machines
//!
//! A machine is identified by the address its receiver listens on, so the
//! same value names a machine locally and as a peer of others.

use std::fmt;
use std::net::SocketAddr;

/// Peer identity - the peer's listening address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub SocketAddr);

impl PeerId {
    #[inline]
    pub fn new(addr: SocketAddr) -> Self {
        PeerId(addr)
    }

    #[inline]
    pub fn addr(self) -> SocketAddr {
        self.0
    }

    #[inline]
    pub fn port(self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for PeerId {
    fn from(addr: SocketAddr) -> Self {
        PeerId(addr)
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_display() {
        let peer = PeerId::new("127.0.0.1:11113".parse().unwrap());
        assert_eq!(peer.to_string(), "127.0.0.1:11113");
        assert_eq!(format!("{:?}", peer), "Peer(127.0.0.1:11113)");
        assert_eq!(peer.port(), 11113);
    }
}
