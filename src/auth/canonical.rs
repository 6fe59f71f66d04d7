//! Canonical request serialization.
//!
//! The signed representation of a request is the literal concatenation
//! `{method}{path}{timestamp}{body}` with no separators. Clients must reproduce
//! it byte-for-byte, so nothing here trims, lowercases, or re-encodes input.

/// Build the canonical bytes that a client signs and the gate verifies.
///
/// # Arguments
/// * `method` - HTTP method exactly as sent (e.g. `POST`)
/// * `path` - URI path without the query string
/// * `timestamp` - the raw timestamp header value
/// * `body` - the raw request body
pub fn canonical_request(method: &str, path: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut out =
        Vec::with_capacity(method.len() + path.len() + timestamp.len() + body.len());
    out.extend_from_slice(method.as_bytes());
    out.extend_from_slice(path.as_bytes());
    out.extend_from_slice(timestamp.as_bytes());
    out.extend_from_slice(body);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_concatenation() {
        let bytes = canonical_request("POST", "/api/v1/upload", "1700000000", b"{\"a\":1}");
        assert_eq!(bytes, b"POST/api/v1/upload1700000000{\"a\":1}".to_vec());
    }

    #[test]
    fn test_deterministic() {
        let body = b"\x00\xffbinary \r\n payload";
        let first = canonical_request("PUT", "/x/y", "42", body);
        for _ in 0..16 {
            assert_eq!(canonical_request("PUT", "/x/y", "42", body), first);
        }
    }

    #[test]
    fn test_no_normalization() {
        // Casing and whitespace are part of the signed bytes.
        let upper = canonical_request("POST", "/Path", " 1", b" body ");
        let lower = canonical_request("post", "/path", "1", b"body");
        assert_ne!(upper, lower);
        assert_eq!(upper, b"POST/Path 1 body ".to_vec());
    }

    #[test]
    fn test_empty_body() {
        let bytes = canonical_request("GET", "/api/v1/keys", "1700000000", b"");
        assert_eq!(bytes, b"GET/api/v1/keys1700000000".to_vec());
    }
}
