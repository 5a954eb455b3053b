//! Raw WebSocket client plumbing (RFC 6455).
//!
//! Just enough of the protocol to talk to a relay without a WebSocket
//! library:
//!
//! - `frame`: masked text frame encoding, plus a lenient single-frame decoder
//! - `handshake`: the HTTP/1.1 upgrade request and a structured response parser
//!
//! ```text
//! UpgradeRequest ──► relay ──► HandshakeResponse::parse ──► validate
//!        │
//!        ▼
//! encode_frame(json) ──► socket
//! ```

mod frame;
mod handshake;

pub use frame::{
    apply_mask, decode_frame, decode_frame_limited, encode_frame, encode_frame_with_mask, Frame,
    FrameError, Opcode, MAX_PAYLOAD_LEN,
};
pub use handshake::{
    compute_accept_key, HandshakeError, HandshakeResponse, UpgradeRequest, MAX_HEADER_BYTES,
    SWITCHING_PROTOCOLS,
};
