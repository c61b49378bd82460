//! Transport seams for the session client.
//!
//! The client never talks to a broker or a socket directly; it goes through
//! these traits so different backends can be plugged in:
//! - A real publish/subscribe client and UDP socket on device
//! - In-memory doubles for testing
//!
//! The factory is handed to the client at construction time. It replaces
//! any process-global accessor for the network stack and is also where the
//! datagram handle for a freshly negotiated endpoint gets built.
//!
//! # Notes
//!
//! - Inbound control messages arrive on whatever thread the control
//!   transport runs its callback on; the client owns no executor.
//! - `Scheduler` is the host's serialized execution context. Goodbye
//!   teardown is pushed through it instead of running inside the message
//!   callback, so the transport never has its state torn down reentrantly.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::session::TransportEndpoint;

/// Callback invoked per inbound control message: (topic, payload).
pub type MessageCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callback invoked when the control connection drops.
pub type DisconnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Publish/subscribe control-session transport.
pub trait ControlTransport: Send + Sync + 'static {
    /// Establish the connection. Returns `false` on failure; no retries.
    fn connect(
        &self,
        host: &str,
        port: u16,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> bool;

    fn set_keep_alive(&self, seconds: u16);

    fn subscribe(&self, topic: &str, qos: u8);

    /// Publish opaque text. Returns `false` on failure.
    fn publish(&self, topic: &str, payload: &str) -> bool;

    fn is_connected(&self) -> bool;

    fn disconnect(&self);

    fn on_disconnected(&self, callback: DisconnectCallback);

    fn on_message(&self, callback: MessageCallback);
}

/// Datagram channel carrying the encrypted audio frames.
///
/// Framing and encryption of those frames happen outside this crate; the
/// client only owns and tears down the handle.
pub trait DatagramTransport: Send {
    /// Send one raw datagram. Returns `false` on failure.
    fn send(&self, data: &[u8]) -> bool;
}

/// Builds the transports the client needs.
pub trait TransportFactory: Send + Sync {
    type Control: ControlTransport;

    /// Create a control transport, or `None` when the stack is unavailable.
    fn create_control(&self) -> Option<Self::Control>;

    /// Connect a datagram transport to a negotiated endpoint.
    fn open_datagram(&self, endpoint: &TransportEndpoint) -> Option<Box<dyn DatagramTransport>>;
}

/// Serialized execution context supplied by the host.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>);
}

// ------------------------------------------------------------
// In-memory doubles for testing
// ------------------------------------------------------------

#[derive(Default)]
struct ControlInner {
    connected: bool,
    fail_connect: bool,
    fail_publish: bool,
    keep_alive: u16,
    subscriptions: Vec<(String, u8)>,
    published: Vec<(String, String)>,
    on_message: Option<MessageCallback>,
    on_disconnected: Option<DisconnectCallback>,
}

/// In-memory control transport.
/// Clones share the same state, so a test can hold one handle while the
/// client owns another.
#[derive(Clone, Default)]
pub struct InMemoryControl {
    inner: Arc<Mutex<ControlInner>>,
}

impl InMemoryControl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `connect` calls fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.inner.lock().fail_connect = fail;
    }

    /// Make subsequent `publish` calls fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.lock().fail_publish = fail;
    }

    /// Deliver an inbound message as the broker would, invoking the
    /// registered callback on the calling thread.
    pub fn deliver(&self, topic: &str, payload: &str) {
        let callback = self.inner.lock().on_message.clone();
        if let Some(callback) = callback {
            callback(topic, payload);
        }
    }

    /// Drop the connection and fire the disconnect callback.
    pub fn drop_connection(&self) {
        let callback = {
            let mut inner = self.inner.lock();
            inner.connected = false;
            inner.on_disconnected.clone()
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// All messages published so far, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<(String, String)> {
        self.inner.lock().published.clone()
    }

    /// Topics subscribed so far.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, u8)> {
        self.inner.lock().subscriptions.clone()
    }

    #[must_use]
    pub fn keep_alive(&self) -> u16 {
        self.inner.lock().keep_alive
    }
}

impl ControlTransport for InMemoryControl {
    fn connect(
        &self,
        _host: &str,
        _port: u16,
        _client_id: &str,
        _username: &str,
        _password: &str,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return false;
        }
        inner.connected = true;
        true
    }

    fn set_keep_alive(&self, seconds: u16) {
        self.inner.lock().keep_alive = seconds;
    }

    fn subscribe(&self, topic: &str, qos: u8) {
        self.inner.lock().subscriptions.push((topic.to_string(), qos));
    }

    fn publish(&self, topic: &str, payload: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.connected || inner.fail_publish {
            return false;
        }
        inner.published.push((topic.to_string(), payload.to_string()));
        true
    }

    fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }

    fn disconnect(&self) {
        self.inner.lock().connected = false;
    }

    fn on_disconnected(&self, callback: DisconnectCallback) {
        self.inner.lock().on_disconnected = Some(callback);
    }

    fn on_message(&self, callback: MessageCallback) {
        self.inner.lock().on_message = Some(callback);
    }
}

/// In-memory datagram transport recording sent payloads.
#[derive(Clone, Default)]
pub struct InMemoryDatagram {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl InMemoryDatagram {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }
}

impl DatagramTransport for InMemoryDatagram {
    fn send(&self, data: &[u8]) -> bool {
        self.sent.lock().push(data.to_vec());
        true
    }
}

/// Factory handing out clones of one shared [`InMemoryControl`] and
/// recording every datagram endpoint it was asked to open.
#[derive(Clone, Default)]
pub struct InMemoryFactory {
    control: InMemoryControl,
    fail_create: Arc<Mutex<bool>>,
    fail_datagram: Arc<Mutex<bool>>,
    opened: Arc<Mutex<Vec<TransportEndpoint>>>,
}

impl InMemoryFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the shared control transport, for delivering messages and
    /// inspecting publishes from tests.
    #[must_use]
    pub fn control(&self) -> InMemoryControl {
        self.control.clone()
    }

    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock() = fail;
    }

    pub fn set_fail_datagram(&self, fail: bool) {
        *self.fail_datagram.lock() = fail;
    }

    /// Endpoints `open_datagram` was called with, oldest first.
    #[must_use]
    pub fn opened_endpoints(&self) -> Vec<TransportEndpoint> {
        self.opened.lock().clone()
    }
}

impl TransportFactory for InMemoryFactory {
    type Control = InMemoryControl;

    fn create_control(&self) -> Option<InMemoryControl> {
        if *self.fail_create.lock() {
            return None;
        }
        Some(self.control.clone())
    }

    fn open_datagram(&self, endpoint: &TransportEndpoint) -> Option<Box<dyn DatagramTransport>> {
        if *self.fail_datagram.lock() {
            return None;
        }
        self.opened.lock().push(endpoint.clone());
        Some(Box::new(InMemoryDatagram::new()))
    }
}

/// Scheduler that queues tasks until a test drains them, standing in for
/// the host's serialized task queue.
#[derive(Clone, Default)]
pub struct QueuedScheduler {
    tasks: Arc<Mutex<Vec<Box<dyn FnOnce() + Send>>>>,
}

impl QueuedScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every queued task in submission order.
    pub fn run_pending(&self) {
        // Tasks may schedule further tasks; swap the queue out first.
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task();
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }
}

impl Scheduler for QueuedScheduler {
    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        self.tasks.lock().push(task);
    }
}
