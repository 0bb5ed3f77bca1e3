//! Lamport clock for a single machine

use clockmesh_core::LogicalTime;

/// Logical clock
/// INVARIANT: the value MUST never decrease, and every event strictly advances it
#[derive(Clone, Debug, Default)]
pub struct LamportClock {
    value: LogicalTime,
}

impl LamportClock {
    /// Create a new clock starting at zero
    pub fn new() -> Self {
        Self::starting_at(LogicalTime::ZERO)
    }

    pub fn starting_at(value: LogicalTime) -> Self {
        LamportClock { value }
    }

    /// Local event (send or internal).
    /// Returns the new time
    pub fn tick(&mut self) -> LogicalTime {
        self.value = self.value.next();
        self.value
    }

    /// Receive event carrying a remote timestamp.
    /// Returns the new time
    pub fn observe(&mut self, remote: LogicalTime) -> LogicalTime {
        self.value = self.value.merge(remote);
        self.value
    }

    /// Current time without advancing
    pub fn now(&self) -> LogicalTime {
        self.value
    }
}
