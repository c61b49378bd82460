//! Completion signal for the hello handshake.
//!
//! The one intentional cross-context synchronization point in the client:
//! `open_channel` blocks on this signal while the control transport's
//! message callback races to raise it from whatever thread it runs on.
//!
//! The signal is one-shot and auto-resetting. Arming it at the start of
//! every open attempt discards any signal left over from a previous
//! attempt, so a late hello from session N cannot satisfy the wait for
//! session N+1.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Binary event flag with a bounded, consuming wait.
#[derive(Default)]
pub struct CompletionSignal {
    raised: Mutex<bool>,
    cond: Condvar,
}

impl CompletionSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear any stale signal before a new wait cycle.
    pub fn arm(&self) {
        *self.raised.lock() = false;
    }

    /// Raise the signal, waking a waiter if one is blocked.
    pub fn raise(&self) {
        *self.raised.lock() = true;
        self.cond.notify_one();
    }

    /// Block until the signal is raised or the timeout expires.
    ///
    /// Returns `true` if the signal was observed; the flag is consumed so
    /// the next wait needs a fresh `raise`.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut raised = self.raised.lock();
        while !*raised {
            if self.cond.wait_until(&mut raised, deadline).timed_out() {
                break;
            }
        }
        let observed = *raised;
        *raised = false;
        observed
    }
}
