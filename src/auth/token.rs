use std::fmt;

/// The shared secret a webhook payload must contain to trigger an update.
///
/// Matching is an unanchored substring search over the raw bytes, so the
/// secret may appear in a query string, a header or a JSON body alike.
#[derive(Clone, PartialEq, Eq)]
pub struct SharedToken(String);

impl SharedToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` if the token occurs anywhere inside `payload`.
    ///
    /// An empty token permits nothing.
    pub fn permits(&self, payload: &[u8]) -> bool {
        let needle = self.0.as_bytes();
        if needle.is_empty() {
            return false;
        }
        payload.windows(needle.len()).any(|window| window == needle)
    }
}

impl fmt::Debug for SharedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SharedToken(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_anywhere_in_payload_is_accepted() {
        let token = SharedToken::new("s3cret");
        assert!(token.permits(b"s3cret"));
        assert!(token.permits(b"POST /hook?token=s3cret HTTP/1.1\r\n"));
        assert!(token.permits(b"{\"secret\":\"s3cret\"}"));
    }

    #[test]
    fn missing_or_partial_token_is_rejected() {
        let token = SharedToken::new("s3cret");
        assert!(!token.permits(b""));
        assert!(!token.permits(b"s3cre"));
        assert!(!token.permits(b"POST /hook?token=S3CRET HTTP/1.1"));
    }

    #[test]
    fn non_utf8_payload_is_searched() {
        let token = SharedToken::new("s3cret");
        let mut payload = vec![0xff, 0xfe, 0x00];
        payload.extend_from_slice(b"s3cret");
        payload.push(0xff);
        assert!(token.permits(&payload));
    }

    #[test]
    fn empty_token_permits_nothing() {
        let token = SharedToken::new("");
        assert!(token.is_empty());
        assert!(!token.permits(b""));
        assert!(!token.permits(b"POST /hook HTTP/1.1\r\n"));
    }

    #[test]
    fn debug_hides_secret() {
        assert!(!format!("{:?}", SharedToken::new("s3cret")).contains("s3cret"));
    }
}
