//! Hex decoding for handshake key material.
//!
//! The session server transmits the AES key and nonce as ASCII hex inside
//! the hello response. Decoding here is deliberately forgiving, matching the
//! wire behavior the server was built against:
//!
//! - Non-hex characters decode as value 0 (no error is raised)
//! - An odd-length input silently drops the trailing nibble
//!
//! Output length is therefore always `input.len() / 2`.

/// Convert a single hex digit to its value. Invalid characters map to 0.
fn nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'A'..=b'F' => c - b'A' + 10,
        b'a'..=b'f' => c - b'a' + 10,
        _ => 0,
    }
}

/// Decode an ASCII hex string into raw bytes.
///
/// Case-insensitive. Never fails; see module docs for the quirks around
/// invalid characters and odd-length input.
#[must_use]
pub fn decode(hex: &str) -> Vec<u8> {
    let bytes = hex.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len() / 2);
    for pair in bytes.chunks_exact(2) {
        decoded.push((nibble(pair[0]) << 4) | nibble(pair[1]));
    }
    decoded
}
