//! Voicelink - session negotiation and secure audio-channel lifecycle
//!
//! Client for a voice-assistant device that negotiates ephemeral encrypted
//! audio transports over a publish/subscribe control session:
//! - Hello/goodbye handshake over JSON control messages
//! - Per-session AES-128 key, nonce and replay-protection counters
//! - Audio-channel state machine (closed → negotiating → open → closed)
//! - Bounded blocking wait bridging the opener to the transport callback
//!
//! ## Architecture
//!
//! ```text
//! Caller (audio pipeline)
//!     ↓ open_channel / close_channel / send_control_message
//! SessionClient
//!     ├── HandshakeController (validates hello, applies session setup)
//!     ├── SessionCrypto       (AES-128 context, nonce, sequence counters)
//!     ├── ChannelLifecycle    (datagram handle, lock, timeout status)
//!     └── CompletionSignal    (hello-received ⇄ blocked opener)
//!     ↓ ControlTransport / DatagramTransport / Scheduler (host-provided)
//! Broker ⇄ control JSON        UDP ⇄ encrypted audio frames
//! ```
//!
//! Framing and encrypting the audio datagrams themselves is the owner's
//! job; this crate provisions the endpoint and key material and owns the
//! channel handle.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod config;
pub mod crypto;
pub mod handshake;
pub mod hex;
pub mod message;
pub mod session;
pub mod signal;
pub mod transport;

pub use channel::ChannelLifecycle;
pub use client::{ClientState, SessionClient, SessionError};
pub use config::{AudioParams, SessionConfig, Tuning};
pub use crypto::{CryptoError, SessionCrypto, KEY_LEN};
pub use handshake::{HandshakeController, HandshakeError};
pub use message::{Goodbye, HelloFrame, HelloRequest, ServerAudioParams, UdpSection, TRANSPORT_UDP};
pub use session::{SessionState, TransportEndpoint};
pub use signal::CompletionSignal;
pub use transport::{
    ControlTransport, DatagramTransport, DisconnectCallback, InMemoryControl, InMemoryDatagram,
    InMemoryFactory, MessageCallback, QueuedScheduler, Scheduler, TransportFactory,
};
