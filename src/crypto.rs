//! Per-session transport crypto state.
//!
//! One `SessionCrypto` instance lives for the whole client and is
//! re-initialized from scratch for every successfully negotiated session:
//! a fresh AES-128 context, the nonce delivered in the hello response, and
//! both direction sequence counters reset to zero.
//!
//! # Security Properties
//!
//! - **Counters never carry over**: sequence counters restart at 0 on every
//!   `initialize` call. Reusing an advanced counter with a fresh key/nonce
//!   pair (or vice versa) would break the framing layer's replay protection.
//! - **Zeroize on teardown**: the nonce buffer is securely cleared on
//!   `clear()` and on drop; the raw key bytes are cleared as soon as the
//!   cipher context is constructed.
//! - **No zero-key fallback**: empty key or nonce material is rejected so a
//!   malformed handshake can never leave the session keyed with garbage.
//!
//! This module only provisions the material. Encrypting and framing the
//! actual audio packets is the datagram layer's job.

use aes::cipher::KeyInit;
use aes::Aes128;
use zeroize::{Zeroize, Zeroizing};

use crate::hex;

/// AES-128 key length in bytes
pub const KEY_LEN: usize = 16;

/// Error types for session crypto setup
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("empty key or nonce material")]
    EmptyMaterial,
    #[error("decoded key is {0} bytes, expected {KEY_LEN}")]
    InvalidKeyLength(usize),
}

/// Encryption context and replay-protection counters for one session.
pub struct SessionCrypto {
    /// AES-128 context, present only between a successful handshake and
    /// the next `clear()`
    cipher: Option<Aes128>,
    /// Per-session nonce decoded from the hello response (zeroized)
    nonce: Zeroizing<Vec<u8>>,
    /// Sequence counter for frames we send
    local_sequence: u32,
    /// Sequence counter for frames we receive
    remote_sequence: u32,
}

impl Default for SessionCrypto {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCrypto {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cipher: None,
            nonce: Zeroizing::new(Vec::new()),
            local_sequence: 0,
            remote_sequence: 0,
        }
    }

    /// Install key material for a new session.
    ///
    /// Decodes both arguments from hex, builds a fresh AES-128 context and
    /// resets both sequence counters to zero. Fully replaces any prior
    /// session's state; callable once per negotiated session.
    pub fn initialize(&mut self, key_hex: &str, nonce_hex: &str) -> Result<(), CryptoError> {
        if key_hex.is_empty() || nonce_hex.is_empty() {
            return Err(CryptoError::EmptyMaterial);
        }

        let key = Zeroizing::new(hex::decode(key_hex));
        if key.len() != KEY_LEN {
            return Err(CryptoError::InvalidKeyLength(key.len()));
        }

        self.cipher = Some(Aes128::new_from_slice(&key).map_err(|_| {
            // new_from_slice only fails on length, checked above
            CryptoError::InvalidKeyLength(key.len())
        })?);
        self.nonce.zeroize();
        *self.nonce = hex::decode(nonce_hex);
        self.local_sequence = 0;
        self.remote_sequence = 0;
        Ok(())
    }

    /// Drop the cipher context and zeroize the nonce.
    pub fn clear(&mut self) {
        self.cipher = None;
        self.nonce.zeroize();
        self.local_sequence = 0;
        self.remote_sequence = 0;
    }

    /// True once `initialize` has succeeded for the current session.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.cipher.is_some()
    }

    /// AES context for the datagram framing layer.
    #[must_use]
    pub fn cipher(&self) -> Option<&Aes128> {
        self.cipher.as_ref()
    }

    /// Session nonce for the datagram framing layer.
    #[must_use]
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    #[must_use]
    pub fn local_sequence(&self) -> u32 {
        self.local_sequence
    }

    #[must_use]
    pub fn remote_sequence(&self) -> u32 {
        self.remote_sequence
    }

    /// Claim the next outbound sequence number.
    pub fn next_local_sequence(&mut self) -> u32 {
        let seq = self.local_sequence;
        self.local_sequence = self.local_sequence.wrapping_add(1);
        seq
    }

    /// Record the highest sequence number seen from the server.
    pub fn note_remote_sequence(&mut self, seq: u32) {
        if seq > self.remote_sequence {
            self.remote_sequence = seq;
        }
    }
}

impl Drop for SessionCrypto {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "00112233445566778899AABBCCDDEEFF";
    const NONCE: &str = "AABBCCDD";

    #[test]
    fn test_initialize_success() {
        let mut crypto = SessionCrypto::new();
        crypto.initialize(KEY, NONCE).unwrap();

        assert!(crypto.is_ready());
        assert_eq!(crypto.nonce(), &[0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(crypto.local_sequence(), 0);
        assert_eq!(crypto.remote_sequence(), 0);
    }

    #[test]
    fn test_initialize_rejects_empty_material() {
        let mut crypto = SessionCrypto::new();
        assert!(matches!(
            crypto.initialize("", NONCE),
            Err(CryptoError::EmptyMaterial)
        ));
        assert!(matches!(
            crypto.initialize(KEY, ""),
            Err(CryptoError::EmptyMaterial)
        ));
        assert!(!crypto.is_ready());
    }

    #[test]
    fn test_initialize_rejects_wrong_key_length() {
        let mut crypto = SessionCrypto::new();
        let result = crypto.initialize("00112233", NONCE);
        assert!(matches!(result, Err(CryptoError::InvalidKeyLength(4))));
        assert!(!crypto.is_ready());
    }

    #[test]
    fn test_reinitialize_resets_counters() {
        let mut crypto = SessionCrypto::new();
        crypto.initialize(KEY, NONCE).unwrap();

        // Advance both directions as the framing layer would
        crypto.next_local_sequence();
        crypto.next_local_sequence();
        crypto.note_remote_sequence(17);
        assert_eq!(crypto.local_sequence(), 2);
        assert_eq!(crypto.remote_sequence(), 17);

        // A second session must start from zero again
        crypto.initialize(KEY, NONCE).unwrap();
        assert_eq!(crypto.local_sequence(), 0);
        assert_eq!(crypto.remote_sequence(), 0);
    }

    #[test]
    fn test_next_local_sequence_increments() {
        let mut crypto = SessionCrypto::new();
        crypto.initialize(KEY, NONCE).unwrap();

        assert_eq!(crypto.next_local_sequence(), 0);
        assert_eq!(crypto.next_local_sequence(), 1);
        assert_eq!(crypto.local_sequence(), 2);
    }

    #[test]
    fn test_remote_sequence_is_monotonic() {
        let mut crypto = SessionCrypto::new();
        crypto.initialize(KEY, NONCE).unwrap();

        crypto.note_remote_sequence(5);
        crypto.note_remote_sequence(3); // stale, ignored
        assert_eq!(crypto.remote_sequence(), 5);
    }

    #[test]
    fn test_clear_drops_state() {
        let mut crypto = SessionCrypto::new();
        crypto.initialize(KEY, NONCE).unwrap();
        crypto.next_local_sequence();

        crypto.clear();
        assert!(!crypto.is_ready());
        assert!(crypto.cipher().is_none());
        assert!(crypto.nonce().is_empty());
        assert_eq!(crypto.local_sequence(), 0);
    }
}
