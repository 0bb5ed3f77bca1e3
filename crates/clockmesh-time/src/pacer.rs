//! Cycle pacing at a fixed tick rate

use std::time::{Duration, Instant};

use clockmesh_core::TickRate;

/// Rate scheduler for the clock engine loop
#[derive(Clone, Copy, Debug)]
pub struct Pacer {
    /// Budget for one cycle (1 / tick rate)
    interval: Duration,
}

impl Pacer {
    pub fn new(rate: TickRate) -> Self {
        Pacer {
            interval: rate.interval(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left to sleep after a cycle that took `elapsed`.
    /// Clamped to zero when the cycle overran its budget.
    pub fn remaining(&self, elapsed: Duration) -> Duration {
        self.interval.saturating_sub(elapsed)
    }

    /// Time left to sleep for a cycle started at `started`
    pub fn remaining_since(&self, started: Instant) -> Duration {
        self.remaining(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_within_budget() {
        let pacer = Pacer::new(TickRate::new(4).unwrap());
        assert_eq!(
            pacer.remaining(Duration::from_millis(100)),
            Duration::from_millis(150)
        );
    }

    #[test]
    fn test_overrun_clamps_to_zero() {
        let pacer = Pacer::new(TickRate::new(6).unwrap());
        assert_eq!(pacer.remaining(Duration::from_secs(2)), Duration::ZERO);
        assert_eq!(pacer.remaining(pacer.interval()), Duration::ZERO);
    }

    #[test]
    fn test_remaining_since_never_exceeds_interval() {
        let pacer = Pacer::new(TickRate::new(2).unwrap());
        let started = Instant::now();
        assert!(pacer.remaining_since(started) <= pacer.interval());
    }
}
