//! Nostr event protocol.
//!
//! Builds events, derives their content-addressed identifiers, obtains
//! signatures from a [`Signer`], and wraps everything into the JSON envelopes
//! relays speak.
//!
//! # Architecture
//!
//! ```text
//! EventBuilder ──► Event ──► canonicalize ──► SHA-256 ──► id
//!                    │
//!                    ▼
//!          Signer::sign(signing_payload) ──► sig
//!                    │
//!                    ▼
//!          ClientMessage::event / ::req ──► JSON ──► ws::encode_frame
//! ```
//!
//! Everything here is synchronous and free of I/O.
//!
//! # Example
//!
//! ```
//! use relay_probe::nostr::{CanonicalForm, ClientMessage, EventBuilder, Filter, SchnorrSigner};
//!
//! let signer = SchnorrSigner::generate();
//! let event = EventBuilder::text_note("hello relay")
//!     .sign_with(&signer, CanonicalForm::default())
//!     .unwrap();
//!
//! let req = ClientMessage::req("test-sub", Filter::new().kinds([1]));
//! let publish = ClientMessage::event(event);
//! assert!(publish.to_json().unwrap().starts_with("[\"EVENT\",{"));
//! assert!(req.to_json().unwrap().starts_with("[\"REQ\""));
//! ```

mod canonical;
mod error;
mod event;
mod filter;
mod message;
mod signer;
mod tags;

pub use canonical::canonical_json;
pub use error::{NostrError, Result};
pub use event::{CanonicalForm, Event, EventBuilder, IDENTIFIER_HEX_LEN, KIND_TEXT_NOTE};
pub use filter::Filter;
pub use message::{ClientMessage, RelayMessage};
pub use signer::{derive_test_identifier, HmacTestSigner, SchnorrSigner, Signer};
pub use tags::TagBuilder;
