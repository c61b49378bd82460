//! Hello-response validation and session setup.
//!
//! One inbound hello either fully configures the session (id, audio
//! parameters, datagram endpoint, crypto material) or changes nothing and
//! reports why. There are no retries here: a rejected hello simply never
//! raises the completion signal, so the opener observes a timeout.

use tracing::{debug, warn};

use crate::crypto::{CryptoError, SessionCrypto};
use crate::message::{HelloFrame, TRANSPORT_UDP};
use crate::session::{SessionState, TransportEndpoint};

/// Validation failures for an inbound hello.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("unsupported transport: {0:?}")]
    UnsupportedTransport(Option<String>),
    #[error("hello response missing required field: udp.{0}")]
    MissingField(&'static str),
    #[error("crypto setup failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Validates hello responses against the transport this client speaks.
pub struct HandshakeController {
    expected_transport: &'static str,
}

impl Default for HandshakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl HandshakeController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            expected_transport: TRANSPORT_UDP,
        }
    }

    /// Apply one hello response.
    ///
    /// On success the session carries the new id and audio parameters, the
    /// crypto state is initialized for the new session, and the datagram
    /// endpoint is returned for the caller to store and connect to. The
    /// caller is responsible for raising the completion signal.
    ///
    /// Every failure path leaves both the session and the crypto state
    /// untouched: transport and required `udp` fields are checked first,
    /// then the key material is installed, and only then does the session
    /// adopt the id and audio parameters.
    pub fn handle_hello(
        &self,
        frame: HelloFrame,
        session: &mut SessionState,
        crypto: &mut SessionCrypto,
    ) -> Result<TransportEndpoint, HandshakeError> {
        if frame.transport.as_deref() != Some(self.expected_transport) {
            warn!(transport = ?frame.transport, "hello rejected: unsupported transport");
            return Err(HandshakeError::UnsupportedTransport(frame.transport));
        }

        // Check the udp sub-object up front so a truncated payload cannot
        // leave a half-adopted session behind.
        let udp = frame.udp.unwrap_or_default();
        let server = non_empty(udp.server, "server")?;
        let port = udp.port.ok_or(HandshakeError::MissingField("port"))?;
        let key = non_empty(udp.key, "key")?;
        let nonce = non_empty(udp.nonce, "nonce")?;

        // Crypto setup can still reject the material (bad key length), so it
        // runs before the session adopts anything from this frame.
        crypto.initialize(&key, &nonce)?;

        if let Some(id) = frame.session_id {
            session.id = id;
        }
        if let Some(audio) = frame.audio_params {
            if audio.sample_rate.is_some() {
                session.server_sample_rate = audio.sample_rate;
            }
            if audio.frame_duration.is_some() {
                session.server_frame_duration = audio.frame_duration;
            }
        }

        debug!(session_id = %session.id, server = %server, port, "hello accepted");
        Ok(TransportEndpoint { server, port })
    }
}

fn non_empty(field: Option<String>, name: &'static str) -> Result<String, HandshakeError> {
    match field {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(HandshakeError::MissingField(name)),
    }
}
