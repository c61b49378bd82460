//! Client configuration
//!
//! Connection parameters for the control session, desired audio parameters
//! for the hello request, and timing tunables (with short values in test
//! builds).

use std::time::Duration;

use serde::Serialize;

/// Audio parameters advertised in the hello request.
#[derive(Clone, Debug, Serialize)]
pub struct AudioParams {
    /// Codec name, e.g. "opus"
    pub format: String,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u32,
    /// Frame duration in milliseconds
    pub frame_duration: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: 16000,
            channels: 1,
            frame_duration: 60,
        }
    }
}

/// Timing tunables
#[derive(Clone, Copy, Debug)]
pub struct Tuning {
    /// Bounded wait for the hello response in `open_channel`
    pub hello_timeout: Duration,
    /// Inactivity threshold after which the channel reports not-open
    pub inactivity_timeout: Duration,
    /// Control-session keep-alive interval in seconds
    pub keep_alive_secs: u16,
}

impl Tuning {
    /// Production values
    pub const PROD: Self = Self {
        hello_timeout: Duration::from_secs(10),
        inactivity_timeout: Duration::from_secs(120),
        keep_alive_secs: 90,
    };

    /// Short values for fast tests
    pub const TEST: Self = Self {
        hello_timeout: Duration::from_millis(100),
        inactivity_timeout: Duration::from_millis(50),
        keep_alive_secs: 90,
    };
}

impl Default for Tuning {
    fn default() -> Self {
        #[cfg(any(test, feature = "test-constants"))]
        {
            Self::TEST
        }
        #[cfg(not(any(test, feature = "test-constants")))]
        {
            Self::PROD
        }
    }
}

/// Session client configuration
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Control-session broker host
    pub endpoint: String,
    /// Control-session broker port
    pub port: u16,
    /// Client identifier presented on connect
    pub client_id: String,
    /// Connect username (may be empty)
    pub username: String,
    /// Connect password (may be empty)
    pub password: String,
    /// Topic used for both publish and subscribe
    pub publish_topic: String,
    /// Handshake protocol version sent in the hello request
    pub protocol_version: u32,
    /// Audio parameters requested in the hello
    pub audio: AudioParams,
    /// Timing tunables
    pub tuning: Tuning,
}

impl SessionConfig {
    /// Create a config for the given broker endpoint and topic, with
    /// default audio parameters and tuning.
    pub fn new(endpoint: impl Into<String>, port: u16, topic: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            port,
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            publish_topic: topic.into(),
            protocol_version: 3,
            audio: AudioParams::default(),
            tuning: Tuning::default(),
        }
    }

    /// True when both the endpoint and topic are configured.
    ///
    /// `start()` refuses to attempt a connection otherwise.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.endpoint.is_empty() && !self.publish_topic.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuning_is_test_values() {
        let tuning = Tuning::default();
        assert_eq!(tuning.hello_timeout, Tuning::TEST.hello_timeout);
    }

    #[test]
    fn test_prod_tuning_values() {
        let prod = Tuning::PROD;
        assert_eq!(prod.hello_timeout, Duration::from_secs(10));
        assert_eq!(prod.keep_alive_secs, 90);
        // Inactivity threshold must comfortably exceed the keep-alive
        // interval so a healthy idle channel never reports timed out.
        assert!(prod.inactivity_timeout > Duration::from_secs(u64::from(prod.keep_alive_secs)));
    }

    #[test]
    fn test_incomplete_config_detected() {
        assert!(SessionConfig::new("broker.example.com", 9501, "topic").is_complete());
        assert!(!SessionConfig::new("", 9501, "topic").is_complete());
        assert!(!SessionConfig::new("broker.example.com", 9501, "").is_complete());
    }

    #[test]
    fn test_default_audio_params() {
        let audio = AudioParams::default();
        assert_eq!(audio.format, "opus");
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.channels, 1);
    }
}
