//! Control-channel wire messages.
//!
//! Everything exchanged over the control session is JSON with a `type`
//! field. The client sends hello requests and goodbye notifications and
//! consumes hello responses and goodbye messages; any other type is
//! forwarded verbatim to the owner.
//!
//! Inbound hello fields are all optional at the serde level: required-field
//! enforcement happens in [`crate::handshake`] so that a malformed payload
//! becomes a contained validation error rather than a parse panic.

use serde::{Deserialize, Serialize};

use crate::config::AudioParams;

/// Transport identifier the handshake must carry.
pub const TRANSPORT_UDP: &str = "udp";

/// Hello request published at the start of channel negotiation.
#[derive(Debug, Serialize)]
pub struct HelloRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub version: u32,
    pub transport: &'static str,
    pub audio_params: &'a AudioParams,
}

impl<'a> HelloRequest<'a> {
    #[must_use]
    pub fn new(version: u32, audio_params: &'a AudioParams) -> Self {
        Self {
            kind: "hello",
            version,
            transport: TRANSPORT_UDP,
            audio_params,
        }
    }
}

/// Goodbye notification, sent on channel close.
///
/// Inbound goodbyes are routed from the raw JSON value so an absent
/// `session_id` stays distinguishable from an empty one.
#[derive(Debug, Serialize)]
pub struct Goodbye<'a> {
    pub session_id: &'a str,
    #[serde(rename = "type")]
    pub kind: &'a str,
}

impl<'a> Goodbye<'a> {
    #[must_use]
    pub fn new(session_id: &'a str) -> Self {
        Self {
            session_id,
            kind: "goodbye",
        }
    }
}

/// Audio parameters announced by the server in a hello response.
#[derive(Debug, Default, Deserialize)]
pub struct ServerAudioParams {
    pub sample_rate: Option<u32>,
    pub frame_duration: Option<u32>,
}

/// The `udp` sub-object of a hello response.
#[derive(Debug, Default, Deserialize)]
pub struct UdpSection {
    pub server: Option<String>,
    pub port: Option<u16>,
    /// AES key as hex
    pub key: Option<String>,
    /// Nonce as hex
    pub nonce: Option<String>,
}

/// Hello response as received. Field presence is validated by the
/// handshake controller, not here.
#[derive(Debug, Default, Deserialize)]
pub struct HelloFrame {
    pub transport: Option<String>,
    pub session_id: Option<String>,
    pub audio_params: Option<ServerAudioParams>,
    pub udp: Option<UdpSection>,
}
