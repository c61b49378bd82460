//! Current-session data model.
//!
//! At most one session is current at a time. A session is created when a
//! hello response is parsed and cleared when a new negotiation starts or the
//! channel closes. An empty id means "no active session"; goodbye messages
//! naming a different, non-empty id are stale and get ignored.

/// Datagram server address learned from the handshake response.
///
/// Valid only between a successful handshake and channel close.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportEndpoint {
    pub server: String,
    pub port: u16,
}

/// Negotiated state of the current session.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    /// Opaque session identifier; empty when no session is active
    pub id: String,
    /// Sample rate announced by the server, if any
    pub server_sample_rate: Option<u32>,
    /// Frame duration (ms) announced by the server, if any
    pub server_frame_duration: Option<u32>,
    /// Datagram endpoint for the audio channel
    pub endpoint: Option<TransportEndpoint>,
}

impl SessionState {
    /// Whether `session_id` from a goodbye message addresses this session.
    ///
    /// An absent id always matches (server-wide close); a non-empty id must
    /// equal the current one.
    #[must_use]
    pub fn matches(&self, session_id: Option<&str>) -> bool {
        match session_id {
            None => true,
            Some(id) => self.id == id,
        }
    }

    /// Forget the current session entirely.
    pub fn clear(&mut self) {
        self.id.clear();
        self.server_sample_rate = None;
        self.server_frame_duration = None;
        self.endpoint = None;
    }
}
