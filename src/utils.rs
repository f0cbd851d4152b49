use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use rand::random;
use sha1::{Digest, Sha1};
use std::time::Instant;
use uuid::Uuid;

/// The magic GUID RFC 6455 §1.3 appends to the client's key before hashing.
pub(crate) const HANDSHAKE_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// `Sec-WebSocket-Accept: base64(sha1(key ++ GUID))`.
pub(crate) fn generate_websocket_accept_value(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(HANDSHAKE_GUID.as_bytes());
    BASE64_STANDARD.encode(sha1.finalize())
}

/// A fresh base64-encoded 16 random byte `Sec-WebSocket-Key`.
pub(crate) fn generate_websocket_key() -> String {
    let random_bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(random_bytes)
}

/// Monotonic tick source backing ping payloads (`spec.md` §9: "monotonic
/// ticks, not wall clock, back ping timestamps"). A tick is just an
/// increasing counter sampled once per process; what matters is that a
/// Pong's echoed payload can be compared back against the value we sent,
/// not that it corresponds to any particular duration.
pub(crate) struct TickSource {
    started_at: Instant,
}

impl TickSource {
    pub(crate) fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Ticks elapsed (in milliseconds) since this source was created.
    pub(crate) fn now(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

/// A fresh connection identifier. Built from `Uuid::new_v8` over random
/// bytes rather than `new_v4`, since only the `v8` feature is enabled.
pub(crate) fn generate_connection_id() -> Uuid {
    let random_bytes: [u8; 16] = random();
    Uuid::new_v8(random_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_value_matches_rfc6455_example() {
        let value = generate_websocket_accept_value("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(value, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn accept_value_matches_second_known_vector() {
        let value = generate_websocket_accept_value("x3JJHMbDL1EzLkh9GBhXDw==");
        assert_eq!(value, "HSmrc0sMlYUkAGmm5OPpG2HaGWk=");
    }

    #[test]
    fn generated_key_is_16_bytes_base64() {
        let key = generate_websocket_key();
        let decoded = BASE64_STANDARD.decode(key).unwrap();
        assert_eq!(decoded.len(), 16);
    }

    #[test]
    fn tick_source_is_non_decreasing() {
        let ticks = TickSource::new();
        let a = ticks.now();
        let b = ticks.now();
        assert!(b >= a);
    }

}
