//! Pending-call table: outstanding calls awaiting their responses.
//!
//! One table per connection, shared by the calling tasks, the response
//! routing path, and the timeout sweep. Entries are independent by
//! correlation id, so a concurrent map ([`DashMap`]) is enough; the
//! remove-then-resolve pattern on each entry guarantees that exactly one of
//! {response, timeout, connection-closed} wins for a given call.
//!
//! The completion slot is a tokio `oneshot` channel: resolved at most once,
//! observed by exactly one waiter.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{FramewireError, Result};

/// A registered call that has been sent but not yet resolved.
struct PendingCall {
    /// Completion slot; consumed on resolution.
    tx: oneshot::Sender<Result<Bytes>>,
    /// Absolute time after which the timeout sweep may expire this call.
    deadline: Instant,
}

/// Concurrent table of in-flight calls keyed by correlation id.
#[derive(Default)]
pub struct PendingCalls {
    table: DashMap<u64, PendingCall>,
}

impl PendingCalls {
    /// Create an empty table.
    pub fn new() -> Self {
        Self {
            table: DashMap::new(),
        }
    }

    /// Register a call before its request frame is transmitted.
    ///
    /// Returns the receiver half of the completion slot. Registration must
    /// happen before the send so a fast response can never race past an
    /// unregistered id.
    pub fn register(&self, correlation_id: u64, deadline: Instant) -> oneshot::Receiver<Result<Bytes>> {
        let (tx, rx) = oneshot::channel();
        self.table.insert(correlation_id, PendingCall { tx, deadline });
        rx
    }

    /// Resolve the call registered under `correlation_id` with the given
    /// outcome, removing it from the table.
    ///
    /// Returns `false` if no entry exists: the call already timed out, was
    /// already resolved, or belonged to a recycled connection. That is an
    /// expected race, not an error.
    pub fn complete(&self, correlation_id: u64, outcome: Result<Bytes>) -> bool {
        match self.table.remove(&correlation_id) {
            Some((_, call)) => {
                // The waiter may have been dropped; nothing to do then.
                let _ = call.tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Expire every entry whose deadline has passed, resolving each with
    /// [`FramewireError::CallTimeout`] exactly once.
    ///
    /// Returns the number of calls expired.
    pub fn expire_due(&self, now: Instant) -> usize {
        let due: Vec<u64> = self
            .table
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();

        let mut expired = 0;
        for id in due {
            // remove() arbitrates against a concurrently arriving response:
            // whoever removes the entry resolves it.
            if self.complete(id, Err(FramewireError::CallTimeout)) {
                expired += 1;
            }
        }
        expired
    }

    /// Fail every remaining entry with [`FramewireError::ConnectionClosed`]
    /// and empty the table.
    pub fn fail_all_closed(&self) -> usize {
        let ids: Vec<u64> = self.table.iter().map(|entry| *entry.key()).collect();

        let mut failed = 0;
        for id in ids {
            if self.complete(id, Err(FramewireError::ConnectionClosed)) {
                failed += 1;
            }
        }
        failed
    }

    /// Number of calls currently in flight.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if no calls are in flight.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
