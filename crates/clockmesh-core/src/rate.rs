//! Tick rate - decision cycles per second

use std::fmt;
use std::time::Duration;

use rand::Rng;

use crate::{ClockError, ClockResult};

/// Number of cycles per second a machine's clock engine targets.
/// INVARIANT: always within `MIN..=MAX`
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TickRate(u32);

impl TickRate {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 6;

    pub fn new(per_second: u32) -> ClockResult<Self> {
        if (Self::MIN..=Self::MAX).contains(&per_second) {
            Ok(TickRate(per_second))
        } else {
            Err(ClockError::InvalidTickRate(per_second))
        }
    }

    /// Draw a rate uniformly from `MIN..=MAX`
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        TickRate(rng.gen_range(Self::MIN..=Self::MAX))
    }

    #[inline]
    pub fn per_second(self) -> u32 {
        self.0
    }

    /// Pacing budget for a single cycle
    #[inline]
    pub fn interval(self) -> Duration {
        Duration::from_secs(1) / self.0
    }
}

impl fmt::Debug for TickRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/s", self.0)
    }
}

impl fmt::Display for TickRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
