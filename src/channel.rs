//! Audio-channel handle ownership and liveness.
//!
//! The datagram handle is the one resource touched from two contexts at
//! once: an arbitrary caller thread asking `is_open` while the scheduled
//! goodbye teardown destroys it. The handle therefore sits behind a lock.
//! The lock only protects the handle itself; `is_open` results can be stale
//! by the time the caller acts on them, and callers must tolerate that.
//!
//! Timeout is a passive staleness check. A quiet channel is reported as
//! not-open on the next query; nothing proactively tears it down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::transport::DatagramTransport;

/// Owns the datagram handle and computes open/timeout status.
pub struct ChannelLifecycle {
    handle: Mutex<Option<Box<dyn DatagramTransport>>>,
    error: AtomicBool,
    last_activity: Mutex<Instant>,
    inactivity_timeout: Duration,
}

impl ChannelLifecycle {
    #[must_use]
    pub fn new(inactivity_timeout: Duration) -> Self {
        Self {
            handle: Mutex::new(None),
            error: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            inactivity_timeout,
        }
    }

    /// Install the handle for a freshly negotiated channel.
    pub fn attach(&self, handle: Box<dyn DatagramTransport>) {
        *self.handle.lock() = Some(handle);
        self.error.store(false, Ordering::Release);
        self.mark_activity();
    }

    /// Release and drop the handle if present.
    ///
    /// Idempotent; returns `true` only when a handle was actually dropped,
    /// so the caller can fire goodbye/closed notifications exactly once.
    pub fn release(&self) -> bool {
        self.handle.lock().take().is_some()
    }

    /// Channel liveness: handle present, no error flagged, not timed out.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let attached = self.handle.lock().is_some();
        attached && !self.error.load(Ordering::Acquire) && !self.is_timed_out()
    }

    /// Whether the inactivity threshold has elapsed since the last
    /// successfully parsed control message.
    #[must_use]
    pub fn is_timed_out(&self) -> bool {
        self.last_activity.lock().elapsed() > self.inactivity_timeout
    }

    /// Record control-channel activity.
    pub fn mark_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    /// Flag the channel as failed; `is_open` reports false until the next
    /// `attach` or `clear_error`.
    pub fn mark_error(&self) {
        self.error.store(true, Ordering::Release);
    }

    pub fn clear_error(&self) {
        self.error.store(false, Ordering::Release);
    }

    /// Send a datagram through the handle, if one is attached.
    pub fn send(&self, data: &[u8]) -> bool {
        match self.handle.lock().as_ref() {
            Some(handle) => handle.send(data),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryDatagram;

    fn channel() -> ChannelLifecycle {
        ChannelLifecycle::new(Duration::from_millis(50))
    }

    #[test]
    fn test_closed_by_default() {
        assert!(!channel().is_open());
    }

    #[test]
    fn test_attach_opens_release_closes() {
        let channel = channel();
        channel.attach(Box::new(InMemoryDatagram::new()));
        assert!(channel.is_open());

        assert!(channel.release());
        assert!(!channel.is_open());
    }

    #[test]
    fn test_release_is_idempotent() {
        let channel = channel();
        channel.attach(Box::new(InMemoryDatagram::new()));

        assert!(channel.release());
        assert!(!channel.release());
        assert!(!channel.release());
    }

    #[test]
    fn test_error_flag_closes_channel() {
        let channel = channel();
        channel.attach(Box::new(InMemoryDatagram::new()));

        channel.mark_error();
        assert!(!channel.is_open());

        channel.clear_error();
        assert!(channel.is_open());
    }

    #[test]
    fn test_inactivity_times_the_channel_out() {
        let channel = channel();
        channel.attach(Box::new(InMemoryDatagram::new()));
        assert!(channel.is_open());

        std::thread::sleep(Duration::from_millis(60));
        assert!(channel.is_timed_out());
        assert!(!channel.is_open());

        // Fresh activity revives it
        channel.mark_activity();
        assert!(channel.is_open());
    }

    #[test]
    fn test_send_through_attached_handle() {
        let channel = channel();
        let datagram = InMemoryDatagram::new();
        channel.attach(Box::new(datagram.clone()));

        assert!(channel.send(b"frame"));
        assert_eq!(datagram.sent(), vec![b"frame".to_vec()]);
    }

    #[test]
    fn test_send_without_handle_fails() {
        assert!(!channel().send(b"frame"));
    }
}
