//! Clock Engine - the per-cycle decision procedure
//!
//! Each cycle either consumes one received timestamp or, when nothing is
//! waiting, draws a random action: send to one peer, broadcast to all
//! peers, or perform an internal event.

use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use clockmesh_core::{InboundQueue, LogicalTime, PeerId, Popped, TickRate};

use crate::LamportClock;

/// Draw values above `peers + 1` that map to an internal event.
/// With two peers this yields the `[1, 10]` draw range.
pub const INTERNAL_DRAWS: u32 = 7;

/// What a cycle does when the inbound queue is empty
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send to a single peer
    Send(PeerId),
    /// Send the same timestamp to every configured peer
    Broadcast,
    /// Advance the clock with no network traffic
    Internal,
}

impl Action {
    /// Inclusive range the decision draw comes from
    pub fn draw_range(peer_count: usize) -> RangeInclusive<u32> {
        1..=(peer_count as u32 + 1 + INTERNAL_DRAWS)
    }

    /// Map a draw to an action.
    ///
    /// `1..=N` picks the matching peer in configured order, `N + 1`
    /// broadcasts, anything else is internal.
    pub fn from_draw(draw: u32, peers: &[PeerId]) -> Action {
        let n = peers.len() as u32;
        match draw {
            d if (1..=n).contains(&d) => Action::Send(peers[(d - 1) as usize]),
            d if n > 0 && d == n + 1 => Action::Broadcast,
            _ => Action::Internal,
        }
    }
}

/// A logical-clock-affecting event produced by one cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClockEvent {
    Received {
        /// Value carried by the frame
        remote: LogicalTime,
        /// Clock after the receive rule
        clock: LogicalTime,
        /// Queue depth left after the pop
        queue_remaining: usize,
    },
    Sent {
        /// Clock after the increment, the value put on the wire
        clock: LogicalTime,
        peers: Vec<PeerId>,
    },
    Internal {
        clock: LogicalTime,
    },
}

impl ClockEvent {
    /// Clock value after the event
    pub fn clock(&self) -> LogicalTime {
        match self {
            ClockEvent::Received { clock, .. }
            | ClockEvent::Sent { clock, .. }
            | ClockEvent::Internal { clock } => *clock,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClockEvent::Received { .. } => "received",
            ClockEvent::Sent { .. } => "sent",
            ClockEvent::Internal { .. } => "internal",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub cycles: u64,
    pub received: u64,
    /// Send events (a broadcast counts once)
    pub sends: u64,
    /// Frames addressed to peers
    pub frames_out: u64,
    pub internal: u64,
}

/// Clock Engine - owns the machine's logical clock and decision state
pub struct ClockEngine {
    clock: LamportClock,
    /// Ordered peer set used for send selection
    peers: Vec<PeerId>,
    /// Fixed for the engine's lifetime
    tick_rate: TickRate,
    rng: StdRng,
    stats: EngineStats,
    /// Set once the clock reaches `LogicalTime::MAX`
    saturated: bool,
}

impl ClockEngine {
    /// Create an engine with a randomly drawn tick rate
    pub fn new(peers: Vec<PeerId>) -> Self {
        Self::with_rng(peers, StdRng::from_entropy())
    }

    /// Create an engine with a caller-supplied random source.
    /// The tick rate is drawn from it first.
    pub fn with_rng(peers: Vec<PeerId>, mut rng: StdRng) -> Self {
        let tick_rate = TickRate::random(&mut rng);
        ClockEngine {
            clock: LamportClock::new(),
            peers,
            tick_rate,
            rng,
            stats: EngineStats::default(),
            saturated: false,
        }
    }

    /// Pin the tick rate instead of keeping the drawn one
    pub fn with_tick_rate(mut self, tick_rate: TickRate) -> Self {
        self.tick_rate = tick_rate;
        self
    }

    /// Start from a given clock value
    pub fn with_clock(mut self, value: LogicalTime) -> Self {
        self.clock = LamportClock::starting_at(value);
        self
    }

    pub fn now(&self) -> LogicalTime {
        self.clock.now()
    }

    pub fn tick_rate(&self) -> TickRate {
        self.tick_rate
    }

    pub fn peers(&self) -> &[PeerId] {
        &self.peers
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// True once the clock has reached `LogicalTime::MAX` and stopped advancing
    pub fn is_saturated(&self) -> bool {
        self.saturated
    }

    /// Run the decision procedure once.
    ///
    /// A cycle that pops a received value does nothing else.
    pub fn cycle(&mut self, inbound: &InboundQueue) -> ClockEvent {
        self.stats.cycles += 1;
        let event = match inbound.pop() {
            Some(popped) => self.receive(popped),
            None => {
                let action = self.decide();
                self.apply(action)
            }
        };
        self.check_saturation();
        event
    }

    fn check_saturation(&mut self) {
        if !self.saturated && self.clock.now() == LogicalTime::MAX {
            self.saturated = true;
            tracing::warn!(
                clock = %LogicalTime::MAX,
                "logical clock saturated; later events will not advance it"
            );
        }
    }

    /// Draw the action for a cycle with an empty queue
    pub fn decide(&mut self) -> Action {
        let draw = self.rng.gen_range(Action::draw_range(self.peers.len()));
        Action::from_draw(draw, &self.peers)
    }

    /// Apply the Lamport receive rule to a popped value
    pub fn receive(&mut self, popped: Popped) -> ClockEvent {
        let clock = self.clock.observe(popped.value);
        self.stats.received += 1;
        tracing::trace!(remote = %popped.value, %clock, remaining = popped.remaining, "receive");
        ClockEvent::Received {
            remote: popped.value,
            clock,
            queue_remaining: popped.remaining,
        }
    }

    /// Execute a send or internal action
    pub fn apply(&mut self, action: Action) -> ClockEvent {
        match action {
            Action::Send(peer) => self.send(vec![peer]),
            Action::Broadcast => self.send(self.peers.clone()),
            Action::Internal => {
                let clock = self.clock.tick();
                self.stats.internal += 1;
                ClockEvent::Internal { clock }
            }
        }
    }

    /// One increment regardless of how many peers are addressed
    fn send(&mut self, peers: Vec<PeerId>) -> ClockEvent {
        let clock = self.clock.tick();
        self.stats.sends += 1;
        self.stats.frames_out += peers.len() as u64;
        ClockEvent::Sent { clock, peers }
    }
}
