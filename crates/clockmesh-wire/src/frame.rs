//! Clock frame for the clockmesh wire protocol
//!
//! Frame = one big-endian u32 logical clock value

use clockmesh_core::{ClockError, ClockResult, LogicalTime};

/// Exact size of every frame on the wire
pub const FRAME_SIZE: usize = 4;

/// A single timestamp message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Sender's logical clock at send time
    pub clock: LogicalTime,
}

impl Frame {
    pub fn new(clock: LogicalTime) -> Self {
        Frame { clock }
    }

    /// Parse a frame from exactly `FRAME_SIZE` bytes.
    ///
    /// Any other length is rejected; a short buffer left behind by a closed
    /// connection must never decode into a clock value.
    pub fn parse(buf: &[u8]) -> ClockResult<Self> {
        let bytes: [u8; FRAME_SIZE] = buf.try_into().map_err(|_| ClockError::FrameLength {
            expected: FRAME_SIZE,
            actual: buf.len(),
        })?;
        Ok(Frame {
            clock: LogicalTime::from_be_bytes(bytes),
        })
    }

    /// Serialize to wire bytes
    pub fn serialize(&self) -> [u8; FRAME_SIZE] {
        self.clock.to_be_bytes()
    }
}

impl From<LogicalTime> for Frame {
    fn from(clock: LogicalTime) -> Self {
        Frame { clock }
    }
}
