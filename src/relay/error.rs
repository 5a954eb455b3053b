//! Error types for relay operations.
//!
//! One variant per failure class a probe run can hit: connecting, the
//! upgrade handshake, encoding outgoing messages, signing, and waiting.

use thiserror::Error;

use crate::nostr::NostrError;
use crate::ws::{FrameError, HandshakeError};

/// Errors that can occur while talking to a relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// TCP connection to the relay failed.
    #[error("Failed to connect to relay {addr}: {reason}")]
    Connection {
        /// The relay address that failed.
        addr: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The WebSocket upgrade was refused or malformed.
    #[error("Handshake with relay {addr} failed: {source}")]
    Handshake {
        /// The relay address.
        addr: String,
        /// What went wrong.
        #[source]
        source: HandshakeError,
    },

    /// An outgoing message could not be encoded.
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// The relay sent bytes that are not a valid frame.
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The signer failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Timeout waiting for an operation.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The relay closed the connection.
    #[error("Connection closed by relay")]
    Closed,

    /// Probe configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

impl From<NostrError> for RelayError {
    fn from(e: NostrError) -> Self {
        match e {
            NostrError::Signing(reason) => Self::Signing(reason),
            NostrError::Encoding(reason) => Self::Encoding(reason),
            NostrError::KeyDerivation(reason) => Self::Config(format!("author credential: {reason}")),
            NostrError::HexError(reason) => Self::Config(format!("author credential: {reason}")),
            other => Self::Encoding(other.to_string()),
        }
    }
}

impl From<FrameError> for RelayError {
    fn from(e: FrameError) -> Self {
        Self::Encoding(e.to_string())
    }
}
