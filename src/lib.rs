//! Relay Probe Library
//!
//! Publishes a signed Nostr event to a relay over a hand-rolled WebSocket
//! client and reports what the relay answers.
//!
//! - [`ws`]: upgrade handshake and RFC 6455 frame codec
//! - [`nostr`]: events, canonical identifiers, signers, and envelopes
//! - [`relay`]: the probe runner, blocking and async

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod nostr;
pub mod relay;
pub mod ws;

pub use relay::{ProbeConfig, ProbeOutcome, ProbeReport, RelayProbe};
