//! Error types for Nostr operations.

use thiserror::Error;

/// Errors that can occur during event construction, canonicalization and signing.
#[derive(Error, Debug)]
pub enum NostrError {
    /// Event fields could not be encoded into the canonical form.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// The signing collaborator failed.
    #[error("Event signing failed: {0}")]
    Signing(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid event structure or content.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Invalid relay message.
    #[error("Invalid relay message: {0}")]
    InvalidMessage(String),

    /// Event signature verification failed.
    #[error("Invalid event signature")]
    InvalidSignature,

    /// Hex encoding/decoding error.
    #[error("Hex encoding error: {0}")]
    HexError(String),
}

/// Result type for Nostr operations.
pub type Result<T> = std::result::Result<T, NostrError>;

impl From<hex::FromHexError> for NostrError {
    fn from(e: hex::FromHexError) -> Self {
        Self::HexError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_encoding() {
        let err = NostrError::Encoding("content is not UTF-8".to_string());
        assert_eq!(err.to_string(), "Encoding failed: content is not UTF-8");
    }

    #[test]
    fn error_display_signing() {
        let err = NostrError::Signing("signer unavailable".to_string());
        assert_eq!(err.to_string(), "Event signing failed: signer unavailable");
    }

    #[test]
    fn error_display_key_derivation() {
        let err = NostrError::KeyDerivation("invalid key".to_string());
        assert_eq!(err.to_string(), "Key derivation failed: invalid key");
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<i32>("invalid").unwrap_err();
        let err: NostrError = json_err.into();
        assert!(matches!(err, NostrError::Serialization(_)));
    }

    #[test]
    fn error_from_hex() {
        let hex_err = hex::decode("not valid hex").unwrap_err();
        let err: NostrError = hex_err.into();
        assert!(matches!(err, NostrError::HexError(_)));
    }

    #[test]
    fn error_display_invalid_event() {
        let err = NostrError::InvalidEvent("missing field".to_string());
        assert_eq!(err.to_string(), "Invalid event: missing field");
    }

    #[test]
    fn error_display_invalid_message() {
        let err = NostrError::InvalidMessage("empty array".to_string());
        assert_eq!(err.to_string(), "Invalid relay message: empty array");
    }

    #[test]
    fn error_display_invalid_signature() {
        let err = NostrError::InvalidSignature;
        assert_eq!(err.to_string(), "Invalid event signature");
    }
}
