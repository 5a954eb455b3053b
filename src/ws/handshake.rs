//! HTTP/1.1 upgrade handshake (RFC 6455 section 4).
//!
//! The request side renders a fixed set of headers. The response side is a
//! small structured parser: status line plus a case-insensitive header map,
//! fed incrementally because the response may arrive across several reads.

use std::collections::HashMap;
use std::fmt::Write as _;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use thiserror::Error;

/// GUID appended to the client key when computing `Sec-WebSocket-Accept`.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Upper bound on the response header block.
pub const MAX_HEADER_BYTES: usize = 16 * 1024;

/// Status code for a successful upgrade.
pub const SWITCHING_PROTOCOLS: u16 = 101;

/// Errors produced while reading or validating the upgrade response.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// The response could not be parsed as HTTP.
    #[error("Malformed handshake response: {0}")]
    Malformed(String),

    /// The header block exceeded [`MAX_HEADER_BYTES`].
    #[error("Handshake headers exceed {0} bytes")]
    HeadersTooLarge(usize),

    /// The server answered with something other than 101.
    #[error("Unexpected handshake status {status} {reason}")]
    UnexpectedStatus {
        /// Returned status code.
        status: u16,
        /// Returned reason phrase.
        reason: String,
    },

    /// `Upgrade: websocket` was missing from the response.
    #[error("Response does not upgrade to websocket")]
    MissingUpgrade,

    /// `Sec-WebSocket-Accept` did not match the request key.
    #[error("Sec-WebSocket-Accept mismatch")]
    AcceptMismatch,
}

/// Computes the `Sec-WebSocket-Accept` value for a client key.
///
/// # Example
///
/// ```
/// use relay_probe::ws::compute_accept_key;
///
/// assert_eq!(
///     compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
///     "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
/// );
/// ```
#[must_use]
pub fn compute_accept_key(client_key: &str) -> String {
    let mut input = String::with_capacity(client_key.len() + WEBSOCKET_GUID.len());
    input.push_str(client_key);
    input.push_str(WEBSOCKET_GUID);
    STANDARD.encode(digest(&SHA1_FOR_LEGACY_USE_ONLY, input.as_bytes()))
}

/// A client upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeRequest {
    /// Host the request is addressed to.
    pub host: String,
    /// Port the request is addressed to.
    pub port: u16,
    /// Request path.
    pub path: String,
    /// Base64-encoded 16-byte nonce.
    pub key: String,
}

impl UpgradeRequest {
    /// Creates a request with a fresh random `Sec-WebSocket-Key`.
    #[must_use]
    pub fn new(host: &str, port: u16, path: &str) -> Self {
        let nonce: [u8; 16] = rand::random();
        Self::with_key(host, port, path, &STANDARD.encode(nonce))
    }

    /// Creates a request with a fixed key.
    #[must_use]
    pub fn with_key(host: &str, port: u16, path: &str, key: &str) -> Self {
        let path = if path.is_empty() { "/" } else { path };
        Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
            key: key.to_string(),
        }
    }

    /// Renders the request bytes, terminated by an empty line.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut request = String::new();
        let _ = write!(
            request,
            "GET {} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.path, self.host, self.port, self.key
        );
        request.into_bytes()
    }

    /// Returns the accept value a compliant server must echo.
    #[must_use]
    pub fn expected_accept(&self) -> String {
        compute_accept_key(&self.key)
    }
}

/// A parsed upgrade response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Status code from the status line.
    pub status: u16,
    /// Reason phrase from the status line.
    pub reason: String,
    headers: HashMap<String, String>,
}

impl HandshakeResponse {
    /// Parses a response from the front of `buf`.
    ///
    /// Returns `Ok(None)` until the blank line ending the header block has
    /// arrived, then the response and the number of bytes it used. Bytes past
    /// that point belong to the first WebSocket frames.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::HeadersTooLarge`] once the buffer passes
    /// [`MAX_HEADER_BYTES`] without a terminator, or
    /// [`HandshakeError::Malformed`] if the status line or a header is invalid.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, HandshakeError> {
        let Some(head_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            if buf.len() > MAX_HEADER_BYTES {
                return Err(HandshakeError::HeadersTooLarge(MAX_HEADER_BYTES));
            }
            return Ok(None);
        };
        if head_end > MAX_HEADER_BYTES {
            return Err(HandshakeError::HeadersTooLarge(MAX_HEADER_BYTES));
        }

        let head = std::str::from_utf8(&buf[..head_end])
            .map_err(|_| HandshakeError::Malformed("headers are not UTF-8".to_string()))?;
        let mut lines = head.split("\r\n");

        let status_line = lines
            .next()
            .ok_or_else(|| HandshakeError::Malformed("empty response".to_string()))?;
        let (status, reason) = parse_status_line(status_line)?;

        let mut headers = HashMap::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HandshakeError::Malformed(format!("bad header line: {line}")))?;
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        Ok(Some((
            Self {
                status,
                reason,
                headers,
            },
            head_end + 4,
        )))
    }

    /// Looks up a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the number of headers received.
    #[must_use]
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if the status is 101.
    #[must_use]
    pub const fn is_switching_protocols(&self) -> bool {
        self.status == SWITCHING_PROTOCOLS
    }

    /// Checks that this response completes the upgrade for `request`.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is not 101, the `Upgrade` header is not
    /// `websocket`, or `Sec-WebSocket-Accept` does not match the request key.
    pub fn validate(&self, request: &UpgradeRequest) -> Result<(), HandshakeError> {
        if !self.is_switching_protocols() {
            return Err(HandshakeError::UnexpectedStatus {
                status: self.status,
                reason: self.reason.clone(),
            });
        }

        let upgraded = self
            .header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
        if !upgraded {
            return Err(HandshakeError::MissingUpgrade);
        }

        match self.header("sec-websocket-accept") {
            Some(accept) if accept == request.expected_accept() => Ok(()),
            _ => Err(HandshakeError::AcceptMismatch),
        }
    }
}

fn parse_status_line(line: &str) -> Result<(u16, String), HandshakeError> {
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(HandshakeError::Malformed(format!(
            "bad status line: {line}"
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| HandshakeError::Malformed(format!("bad status code: {line}")))?;
    let reason = parts.next().unwrap_or_default().to_string();
    Ok((status, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_KEY: &str = "dGhlIHNhbXBsZSBub25jZQ==";

    fn sample_response() -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            compute_accept_key(SAMPLE_KEY)
        )
    }

    #[test]
    fn accept_key_matches_rfc_sample() {
        assert_eq!(
            compute_accept_key(SAMPLE_KEY),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn request_renders_fixed_headers() {
        let request = UpgradeRequest::with_key("127.0.0.1", 8080, "/", SAMPLE_KEY);
        let text = String::from_utf8(request.to_bytes()).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(text.contains("Host: 127.0.0.1:8080\r\n"));
        assert!(text.contains("Upgrade: websocket\r\n"));
        assert!(text.contains("Connection: Upgrade\r\n"));
        assert!(text.contains("Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n"));
        assert!(text.contains("Sec-WebSocket-Version: 13\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn empty_path_defaults_to_root() {
        let request = UpgradeRequest::with_key("relay", 80, "", SAMPLE_KEY);
        assert_eq!(request.path, "/");
    }

    #[test]
    fn random_keys_are_16_bytes() {
        let request = UpgradeRequest::new("relay", 80, "/");
        let decoded = STANDARD.decode(&request.key).unwrap();
        assert_eq!(decoded.len(), 16);
        assert_ne!(request.key, UpgradeRequest::new("relay", 80, "/").key);
    }

    #[test]
    fn parse_complete_response() {
        let raw = sample_response();
        let (response, used) = HandshakeResponse::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(used, raw.len());
        assert_eq!(response.status, 101);
        assert_eq!(response.reason, "Switching Protocols");
        assert_eq!(response.header("UPGRADE"), Some("websocket"));
        assert_eq!(response.header_count(), 3);
    }

    #[test]
    fn parse_waits_for_header_terminator() {
        let raw = sample_response();
        let bytes = raw.as_bytes();
        for cut in [0, 10, bytes.len() - 2, bytes.len() - 1] {
            assert_eq!(HandshakeResponse::parse(&bytes[..cut]).unwrap(), None);
        }
    }

    #[test]
    fn parse_reports_trailing_frame_bytes() {
        let mut raw = sample_response().into_bytes();
        let header_len = raw.len();
        raw.extend_from_slice(&[0x81, 0x02, b'o', b'k']);
        let (_, used) = HandshakeResponse::parse(&raw).unwrap().unwrap();
        assert_eq!(used, header_len);
        assert_eq!(&raw[used..], &[0x81, 0x02, b'o', b'k']);
    }

    #[test]
    fn parse_rejects_garbage_status_line() {
        let err = HandshakeResponse::parse(b"SSH-2.0-OpenSSH\r\n\r\n").unwrap_err();
        assert!(matches!(err, HandshakeError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_oversized_headers() {
        let raw = vec![b'a'; MAX_HEADER_BYTES + 1];
        assert_eq!(
            HandshakeResponse::parse(&raw),
            Err(HandshakeError::HeadersTooLarge(MAX_HEADER_BYTES))
        );
    }

    #[test]
    fn validate_accepts_matching_response() {
        let request = UpgradeRequest::with_key("relay", 80, "/", SAMPLE_KEY);
        let raw = sample_response();
        let (response, _) = HandshakeResponse::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(response.validate(&request), Ok(()));
    }

    #[test]
    fn validate_rejects_non_101() {
        let request = UpgradeRequest::with_key("relay", 80, "/", SAMPLE_KEY);
        let raw = "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\n\r\n";
        let (response, _) = HandshakeResponse::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(
            response.validate(&request),
            Err(HandshakeError::UnexpectedStatus {
                status: 403,
                reason: "Forbidden".to_string()
            })
        );
    }

    #[test]
    fn validate_rejects_wrong_accept() {
        let request = UpgradeRequest::with_key("relay", 80, "/", "b3RoZXIga2V5IGhlcmUhIQ==");
        let raw = sample_response();
        let (response, _) = HandshakeResponse::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(
            response.validate(&request),
            Err(HandshakeError::AcceptMismatch)
        );
    }

    #[test]
    fn validate_rejects_missing_upgrade() {
        let request = UpgradeRequest::with_key("relay", 80, "/", SAMPLE_KEY);
        let raw = "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\n\r\n";
        let (response, _) = HandshakeResponse::parse(raw.as_bytes()).unwrap().unwrap();
        assert_eq!(
            response.validate(&request),
            Err(HandshakeError::MissingUpgrade)
        );
    }
}
