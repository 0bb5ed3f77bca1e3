//! Inbound queue shared between a machine's receiver and its clock engine
//!
//! The receiver pushes every decoded clock value; the engine pops one value
//! per cycle. Removal is last-in-first-out: the most recently received value
//! is processed first.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::LogicalTime;

/// A value removed from the queue together with the depth left behind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Popped {
    pub value: LogicalTime,
    pub remaining: usize,
}

/// Unbounded, thread-shared LIFO of received clock values
///
/// Cloning yields another handle to the same queue.
#[derive(Clone, Debug, Default)]
pub struct InboundQueue {
    inner: Arc<Mutex<Vec<LogicalTime>>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a received value
    pub fn push(&self, value: LogicalTime) {
        self.inner.lock().push(value);
    }

    /// Remove the newest value.
    ///
    /// The emptiness check and the removal happen under one lock, so two
    /// consumers can never both observe the same item.
    pub fn pop(&self) -> Option<Popped> {
        let mut items = self.inner.lock();
        let value = items.pop()?;
        Some(Popped {
            value,
            remaining: items.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Copy of the queued values, oldest first
    pub fn snapshot(&self) -> Vec<LogicalTime> {
        self.inner.lock().clone()
    }
}
