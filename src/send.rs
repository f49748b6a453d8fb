//! Gate in front of outbound sends.
//!
//! Check-then-record over the shared send log is one critical section, so
//! two concurrent senders cannot both pass the check and exceed the window
//! cap. The network send itself happens outside the lock.

use crate::rate_limit;
use crate::storage::Storage;
use std::sync::{Arc, Mutex};

/// A send was rate-limited; not an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateDecision {
    Proceed,
    /// Blocked until `retry_after` (epoch seconds).
    Limited { retry_after: f64 },
}

/// Result of a gated send.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome<T> {
    Sent(T),
    Limited { retry_after: f64 },
}

impl<T> SendOutcome<T> {
    pub fn is_limited(&self) -> bool {
        matches!(self, SendOutcome::Limited { .. })
    }
}

#[derive(Clone, Debug)]
pub struct SendGate {
    storage: Arc<Mutex<Storage>>,
}

impl SendGate {
    pub fn new(storage: Arc<Mutex<Storage>>) -> Self {
        Self { storage }
    }

    /// Atomically checks the limit and, when allowed, records the send at
    /// `now`. Callers perform the network send after this returns
    /// [`GateDecision::Proceed`].
    pub fn try_acquire(&self, now: f64) -> GateDecision {
        let mut storage = self.storage.lock().expect("send log lock poisoned");
        let log = storage.send_timestamps(now);
        if !rate_limit::allow(&log, now) {
            return GateDecision::Limited {
                retry_after: rate_limit::retry_after(&log),
            };
        }
        if let Err(err) = storage.record_send(now) {
            tracing::warn!("failed to persist send timestamp: {err}");
        }
        GateDecision::Proceed
    }
}
