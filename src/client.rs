//! Session client orchestrator.
//!
//! Owns the control session, the handshake, the crypto state and the audio
//! channel, and implements the public open/close/send contract:
//!
//! - `open_channel` runs synchronously on its caller and blocks (bounded)
//!   until the hello response arrives on the control transport's callback
//!   thread — the one deliberate cross-context handoff in this crate.
//! - Inbound control messages are routed per `type`: hello runs the
//!   handshake, goodbye schedules teardown on the host's serialized
//!   context, everything else is forwarded to the owner.
//! - A malformed message is logged and dropped; it can never crash the
//!   client or corrupt the current session. Callers only ever see failure
//!   as an error return from `open_channel` / `send_control_message`.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::channel::ChannelLifecycle;
use crate::config::SessionConfig;
use crate::crypto::SessionCrypto;
use crate::handshake::HandshakeController;
use crate::message::{Goodbye, HelloRequest};
use crate::session::SessionState;
use crate::signal::CompletionSignal;
use crate::transport::{ControlTransport, Scheduler, TransportFactory};

/// Failures surfaced by the public client operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("control endpoint or topic not configured")]
    Configuration,
    #[error("failed to establish the control session or audio channel")]
    ConnectFailed,
    #[error("failed to publish on the control session")]
    PublishFailed,
    #[error("timed out waiting for the hello response")]
    HelloTimeout,
}

/// Connection/negotiation state of the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// No control session, or the connection dropped
    Idle,
    /// Control session up, no audio channel
    Connecting,
    /// Hello sent, blocked on the completion signal
    AwaitingHello,
    /// Audio channel negotiated and attached
    ChannelOpen,
    /// Teardown in progress
    ChannelClosing,
}

type ClosedHook = Box<dyn Fn() + Send + Sync>;
type IncomingHook = Box<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct Hooks {
    on_channel_closed: Mutex<Option<ClosedHook>>,
    on_incoming_json: Mutex<Option<IncomingHook>>,
}

struct Shared<F: TransportFactory> {
    /// Self-reference handed to transport callbacks and scheduled tasks,
    /// so neither keeps the client alive
    self_weak: Weak<Shared<F>>,
    config: SessionConfig,
    factory: F,
    scheduler: Arc<dyn Scheduler>,
    handshake: HandshakeController,
    control: Mutex<Option<F::Control>>,
    session: Mutex<SessionState>,
    crypto: Mutex<SessionCrypto>,
    channel: ChannelLifecycle,
    signal: CompletionSignal,
    state: Mutex<ClientState>,
    hooks: Hooks,
}

/// Negotiates sessions over a publish/subscribe control transport and
/// manages the resulting encrypted audio channel.
pub struct SessionClient<F: TransportFactory + 'static> {
    shared: Arc<Shared<F>>,
}

impl<F: TransportFactory + 'static> SessionClient<F> {
    pub fn new(factory: F, config: SessionConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let channel = ChannelLifecycle::new(config.tuning.inactivity_timeout);
        Self {
            shared: Arc::new_cyclic(|weak| Shared {
                self_weak: weak.clone(),
                config,
                factory,
                scheduler,
                handshake: HandshakeController::new(),
                control: Mutex::new(None),
                session: Mutex::new(SessionState::default()),
                crypto: Mutex::new(SessionCrypto::new()),
                channel,
                signal: CompletionSignal::new(),
                state: Mutex::new(ClientState::Idle),
                hooks: Hooks::default(),
            }),
        }
    }

    /// Establish the control session. Safe to call once at startup; any
    /// retry/backoff policy belongs to the caller.
    pub fn start(&self) -> Result<(), SessionError> {
        self.shared.start_control()
    }

    /// Negotiate and open the audio channel.
    ///
    /// Blocks the caller until the handshake completes or the bounded wait
    /// expires. [`SessionError::HelloTimeout`] is the only timeout this
    /// client ever reports.
    pub fn open_channel(&self) -> Result<(), SessionError> {
        self.shared.open_channel()
    }

    /// Tear down the audio channel. Idempotent; a no-op when nothing is
    /// open.
    pub fn close_channel(&self) {
        self.shared.close_channel();
    }

    /// Publish opaque text on the control topic.
    pub fn send_control_message(&self, text: &str) -> Result<(), SessionError> {
        self.shared.send_control_message(text)
    }

    /// Channel liveness. The result may be stale by the time the caller
    /// acts on it.
    #[must_use]
    pub fn is_audio_channel_open(&self) -> bool {
        self.shared.channel.is_open()
    }

    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.shared.state.lock()
    }

    /// Identifier of the current session; empty when none is active.
    #[must_use]
    pub fn session_id(&self) -> String {
        self.shared.session.lock().id.clone()
    }

    /// Negotiated session attributes (endpoint, server audio parameters).
    #[must_use]
    pub fn session(&self) -> SessionState {
        self.shared.session.lock().clone()
    }

    /// Crypto material for the datagram framing layer.
    pub fn crypto(&self) -> MutexGuard<'_, SessionCrypto> {
        self.shared.crypto.lock()
    }

    /// The audio channel, for sending framed datagrams.
    #[must_use]
    pub fn channel(&self) -> &ChannelLifecycle {
        &self.shared.channel
    }

    /// Called exactly once per actual channel teardown.
    pub fn on_channel_closed(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.shared.hooks.on_channel_closed.lock() = Some(Box::new(hook));
    }

    /// Called with every inbound JSON message of unrecognized type.
    pub fn on_incoming_json(&self, hook: impl Fn(&Value) + Send + Sync + 'static) {
        *self.shared.hooks.on_incoming_json.lock() = Some(Box::new(hook));
    }
}

impl<F: TransportFactory + 'static> Shared<F> {
    fn start_control(&self) -> Result<(), SessionError> {
        if !self.config.is_complete() {
            error!("control endpoint or publish topic not configured");
            return Err(SessionError::Configuration);
        }

        *self.state.lock() = ClientState::Connecting;

        let Some(control) = self.factory.create_control() else {
            error!("failed to create control transport");
            *self.state.lock() = ClientState::Idle;
            return Err(SessionError::ConnectFailed);
        };

        control.set_keep_alive(self.config.tuning.keep_alive_secs);

        let weak = self.self_weak.clone();
        control.on_disconnected(Arc::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.handle_disconnected();
            }
        }));

        let weak = self.self_weak.clone();
        control.on_message(Arc::new(move |topic, payload| {
            if let Some(shared) = weak.upgrade() {
                shared.handle_incoming(topic, payload);
            }
        }));

        if !control.connect(
            &self.config.endpoint,
            self.config.port,
            &self.config.client_id,
            &self.config.username,
            &self.config.password,
        ) {
            error!(endpoint = %self.config.endpoint, "control session connect failed");
            *self.state.lock() = ClientState::Idle;
            return Err(SessionError::ConnectFailed);
        }

        info!(endpoint = %self.config.endpoint, "control session connected");
        control.subscribe(&self.config.publish_topic, 1);
        *self.control.lock() = Some(control);
        Ok(())
    }

    fn open_channel(&self) -> Result<(), SessionError> {
        let connected = self
            .control
            .lock()
            .as_ref()
            .is_some_and(ControlTransport::is_connected);
        if !connected {
            info!("control session not connected, reconnecting");
            self.start_control()?;
        }

        // Fresh negotiation: drop anything left from the previous session
        // before the hello goes out, so a stale signal or session id can
        // never satisfy this attempt.
        self.channel.clear_error();
        self.session.lock().clear();
        self.signal.arm();
        *self.state.lock() = ClientState::AwaitingHello;

        let request = HelloRequest::new(self.config.protocol_version, &self.config.audio);
        let payload = match serde_json::to_string(&request) {
            Ok(payload) => payload,
            Err(err) => {
                error!(%err, "failed to encode hello request");
                *self.state.lock() = ClientState::Connecting;
                return Err(SessionError::PublishFailed);
            }
        };
        if self.send_control_message(&payload).is_err() {
            error!("failed to publish hello request");
            *self.state.lock() = ClientState::Connecting;
            return Err(SessionError::PublishFailed);
        }

        if !self.signal.wait(self.config.tuning.hello_timeout) {
            warn!("timed out waiting for hello response");
            *self.state.lock() = ClientState::Connecting;
            return Err(SessionError::HelloTimeout);
        }

        // The handshake stored the endpoint before raising the signal.
        let endpoint = self.session.lock().endpoint.clone();
        let Some(endpoint) = endpoint else {
            *self.state.lock() = ClientState::Connecting;
            return Err(SessionError::ConnectFailed);
        };

        let Some(handle) = self.factory.open_datagram(&endpoint) else {
            error!(server = %endpoint.server, port = endpoint.port, "failed to open datagram channel");
            *self.state.lock() = ClientState::Connecting;
            return Err(SessionError::ConnectFailed);
        };

        self.channel.attach(handle);
        *self.state.lock() = ClientState::ChannelOpen;
        info!(session_id = %self.session.lock().id, "audio channel open");
        Ok(())
    }

    fn close_channel(&self) {
        *self.state.lock() = ClientState::ChannelClosing;

        // Only an actual release sends goodbye and notifies the owner;
        // closing an already-closed channel stays a strict no-op.
        if self.channel.release() {
            let session_id = self.session.lock().id.clone();
            match serde_json::to_string(&Goodbye::new(&session_id)) {
                Ok(goodbye) => {
                    if self.send_control_message(&goodbye).is_err() {
                        warn!("failed to publish goodbye");
                    }
                }
                // Nothing goes on the wire rather than a garbled frame
                Err(err) => warn!(%err, "failed to encode goodbye"),
            }

            self.session.lock().clear();
            self.crypto.lock().clear();

            info!(session_id = %session_id, "audio channel closed");
            if let Some(hook) = self.hooks.on_channel_closed.lock().as_ref() {
                hook();
            }
        }

        let connected = self
            .control
            .lock()
            .as_ref()
            .is_some_and(ControlTransport::is_connected);
        *self.state.lock() = if connected {
            ClientState::Connecting
        } else {
            ClientState::Idle
        };
    }

    fn send_control_message(&self, text: &str) -> Result<(), SessionError> {
        if self.config.publish_topic.is_empty() {
            return Err(SessionError::Configuration);
        }
        let control = self.control.lock();
        let Some(control) = control.as_ref() else {
            warn!("control transport not initialized");
            return Err(SessionError::PublishFailed);
        };
        if !control.publish(&self.config.publish_topic, text) {
            warn!("publish failed");
            return Err(SessionError::PublishFailed);
        }
        Ok(())
    }

    /// Route one inbound control message. Runs on the transport's callback
    /// context; every failure is contained here.
    fn handle_incoming(&self, topic: &str, payload: &str) {
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(%topic, %err, "discarding unparseable control message");
                return;
            }
        };
        let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
            warn!(%topic, "discarding control message without type");
            return;
        };

        self.channel.mark_activity();

        match kind.as_str() {
            "hello" => self.handle_hello(value),
            "goodbye" => self.handle_goodbye(&value),
            _ => {
                debug!(%kind, "forwarding control message to owner");
                if let Some(hook) = self.hooks.on_incoming_json.lock().as_ref() {
                    hook(&value);
                }
            }
        }
    }

    fn handle_hello(&self, value: Value) {
        let frame = match serde_json::from_value(value) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(%err, "discarding malformed hello response");
                return;
            }
        };

        let mut session = self.session.lock();
        let mut crypto = self.crypto.lock();
        match self.handshake.handle_hello(frame, &mut session, &mut crypto) {
            Ok(endpoint) => {
                session.endpoint = Some(endpoint);
                drop(crypto);
                drop(session);
                self.signal.raise();
            }
            Err(err) => {
                // Contained: the opener's bounded wait reports the failure.
                warn!(%err, "hello response rejected");
            }
        }
    }

    fn handle_goodbye(&self, value: &Value) {
        let session_id = value.get("session_id").and_then(Value::as_str);
        if !self.session.lock().matches(session_id) {
            debug!(?session_id, "ignoring goodbye for stale session");
            return;
        }

        info!(?session_id, "goodbye received, scheduling channel close");
        let weak = self.self_weak.clone();
        self.scheduler.schedule(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.close_channel();
            }
        }));
    }

    fn handle_disconnected(&self) {
        warn!("control session disconnected");
        // An open channel cannot outlive its control session.
        self.channel.mark_error();
        *self.state.lock() = ClientState::Idle;
    }
}

impl<F: TransportFactory> Drop for Shared<F> {
    fn drop(&mut self) {
        if let Some(control) = self.control.get_mut().as_ref() {
            control.disconnect();
        }
        self.channel.release();
        // SessionCrypto zeroizes itself on drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{InMemoryFactory, QueuedScheduler};

    fn client_with(
        factory: InMemoryFactory,
        scheduler: QueuedScheduler,
    ) -> SessionClient<InMemoryFactory> {
        let mut config = SessionConfig::new("broker.example.com", 9501, "devices/voice");
        config.client_id = "device-1".to_string();
        SessionClient::new(factory, config, Arc::new(scheduler))
    }

    #[test]
    fn test_start_rejects_incomplete_config() {
        let factory = InMemoryFactory::new();
        let config = SessionConfig::new("", 9501, "topic");
        let client = SessionClient::new(factory, config, Arc::new(QueuedScheduler::new()));

        assert!(matches!(client.start(), Err(SessionError::Configuration)));
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn test_start_connects_and_subscribes() {
        let factory = InMemoryFactory::new();
        let control = factory.control();
        let client = client_with(factory, QueuedScheduler::new());

        client.start().unwrap();
        assert_eq!(client.state(), ClientState::Connecting);
        assert_eq!(control.keep_alive(), 90);
        assert_eq!(control.subscriptions(), vec![("devices/voice".to_string(), 1)]);
    }

    #[test]
    fn test_start_surfaces_connect_failure() {
        let factory = InMemoryFactory::new();
        factory.control().set_fail_connect(true);
        let client = client_with(factory, QueuedScheduler::new());

        assert!(matches!(client.start(), Err(SessionError::ConnectFailed)));
        assert_eq!(client.state(), ClientState::Idle);
    }

    #[test]
    fn test_send_control_message_requires_transport() {
        let client = client_with(InMemoryFactory::new(), QueuedScheduler::new());
        // start() never called: fail fast, no panic
        assert!(matches!(
            client.send_control_message("{}"),
            Err(SessionError::PublishFailed)
        ));
    }

    #[test]
    fn test_send_control_message_publishes() {
        let factory = InMemoryFactory::new();
        let control = factory.control();
        let client = client_with(factory, QueuedScheduler::new());
        client.start().unwrap();

        client.send_control_message(r#"{"type":"listen"}"#).unwrap();
        let published = control.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "devices/voice");
    }

    #[test]
    fn test_close_channel_without_open_is_noop() {
        let factory = InMemoryFactory::new();
        let control = factory.control();
        let client = client_with(factory, QueuedScheduler::new());
        client.start().unwrap();

        client.close_channel();
        // No goodbye published for a channel that never opened
        assert!(control.published().is_empty());
        assert_eq!(client.state(), ClientState::Connecting);
    }

    #[test]
    fn test_unparseable_payload_is_discarded() {
        let factory = InMemoryFactory::new();
        let control = factory.control();
        let client = client_with(factory, QueuedScheduler::new());
        client.start().unwrap();

        control.deliver("devices/voice", "not json at all");
        control.deliver("devices/voice", r#"{"no_type": true}"#);
        assert_eq!(client.state(), ClientState::Connecting);
        assert!(!client.is_audio_channel_open());
    }

    #[test]
    fn test_unrecognized_type_forwarded_to_hook() {
        let factory = InMemoryFactory::new();
        let control = factory.control();
        let client = client_with(factory, QueuedScheduler::new());

        let seen: Arc<Mutex<Vec<String>>> = Arc::default();
        let sink = Arc::clone(&seen);
        client.on_incoming_json(move |value| {
            sink.lock().push(value["type"].as_str().unwrap_or("").to_string());
        });

        client.start().unwrap();
        control.deliver("devices/voice", r#"{"type":"tts","state":"start"}"#);
        assert_eq!(seen.lock().as_slice(), ["tts".to_string()]);
    }
}
