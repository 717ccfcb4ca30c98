//! Cache key derivation.
//!
//! The live request path fingerprints the *raw, pre-rewrite* client request
//! bytes up to and including the first `\r\n\r\n`, which is why `classify`
//! always keeps a copy of the original buffer alongside any rewritten one.
//! `create_cache_key` is kept as a secondary helper for callers (mostly
//! tests) that want a deterministic key from `(host, port, path)` without a
//! raw buffer in hand.

use xxhash_rust::xxh64::xxh64;

/// Fingerprint of the raw client request bytes.
pub fn fingerprint(raw_request: &[u8]) -> u64 {
    xxh64(raw_request, 0)
}

/// Tuple-based hash, used by tests exercising key determinism in isolation
/// from a concrete request buffer.
pub fn create_cache_key(host: &str, port: u16, path: &str) -> u64 {
    xxh64(format!("{host}:{port}{path}").as_bytes(), 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        let req = b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n";
        assert_eq!(fingerprint(req), fingerprint(req));
    }

    #[test]
    fn fingerprint_distinguishes_byte_variation() {
        let a = b"GET /foo HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let b = b"GET /foo HTTP/1.1\r\nHost: Example.com\r\n\r\n";
        assert_ne!(fingerprint(a), fingerprint(b));
    }

    #[test]
    fn cache_key_deterministic_and_distinguishing() {
        let k1 = create_cache_key("example.com", 80, "/index.html");
        let k2 = create_cache_key("example.com", 80, "/index.html");
        let k3 = create_cache_key("example.com", 80, "/other.html");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
    }
}
