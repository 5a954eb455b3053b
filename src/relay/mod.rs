//! Relay probing over a plain TCP WebSocket.
//!
//! A probe opens one connection, upgrades it, subscribes, publishes one
//! signed event, and waits once for whatever the relay says back.
//!
//! # Architecture
//!
//! ```text
//! ProbeConfig
//!     │
//!     ▼
//! RelayProbe::prepare  (sign + frame, no I/O)
//!     │
//!     ├──► RelayConnection       (std::net, run)
//!     └──► AsyncRelayConnection  (tokio, run_async)
//!             │
//!             ▼
//!     upgrade ──► REQ ──► EVENT ──► read_replies
//!             │
//!             ▼
//!        ProbeReport
//! ```
//!
//! # Outcomes
//!
//! | Situation | Outcome |
//! |-----------|---------|
//! | Relay sends one or more frames | `Response` |
//! | Reply read times out | `NoResponse` |
//! | Connect, handshake, encode, or sign fails | `Failed` |
//!
//! Both runners share the handshake parser and frame codec in [`crate::ws`];
//! only the socket calls differ.

mod async_connection;
mod config;
mod connection;
mod error;
mod probe;
mod types;

pub use async_connection::AsyncRelayConnection;
pub use config::{ProbeConfig, SigningMode};
pub use connection::RelayConnection;
pub use error::{RelayError, RelayResult};
pub use probe::{ProbePlan, RelayProbe};
pub use types::{ProbeOutcome, ProbeReport, RelayReply, MAX_REPLY_PAYLOAD};
