//! Logical time primitives
//!
//! Machines order events with a Lamport clock:
//! - local events (send, internal) advance the clock by one
//! - a receive advances it to `max(local, received) + 1`

use std::fmt;

/// Lamport logical time, carried on the wire as a big-endian u32
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LogicalTime(pub u32);

impl LogicalTime {
    pub const ZERO: LogicalTime = LogicalTime(0);
    pub const MAX: LogicalTime = LogicalTime(u32::MAX);

    #[inline]
    pub fn new(value: u32) -> Self {
        LogicalTime(value)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    /// The next local tick. Saturates at `u32::MAX`.
    #[inline]
    pub fn next(self) -> Self {
        LogicalTime(self.0.saturating_add(1))
    }

    /// Lamport receive rule: `max(self, remote) + 1`
    #[inline]
    pub fn merge(self, remote: LogicalTime) -> Self {
        self.max(remote).next()
    }

    #[inline]
    pub fn to_be_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    #[inline]
    pub fn from_be_bytes(bytes: [u8; 4]) -> Self {
        LogicalTime(u32::from_be_bytes(bytes))
    }
}

impl From<u32> for LogicalTime {
    fn from(value: u32) -> Self {
        LogicalTime(value)
    }
}

impl fmt::Debug for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl fmt::Display for LogicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
