//! Nostr event model, canonical form and identifier derivation.
//!
//! Lifecycle of an outgoing note:
//!
//! ```text
//! Event::new / EventBuilder       id = "", sig = ""
//!          │
//!          ▼
//! canonicalize(form) ──► SHA-256 ──► id
//!          │
//!          ▼
//! signing_payload() ──► Signer ──► sig
//!          │
//!          ▼
//! ClientMessage::event(..)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::nostr::canonical::canonical_json;
use crate::nostr::error::{NostrError, Result};
use crate::nostr::signer::Signer;

/// Event kind for plain text notes.
pub const KIND_TEXT_NOTE: u16 = 1;

/// Length of a hex-encoded identifier.
pub const IDENTIFIER_HEX_LEN: usize = 64;

/// Serialization hashed to derive the event identifier.
///
/// Neither form includes `id` or `sig`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalForm {
    /// `{"content":..,"created_at":..,"kind":..,"pubkey":..,"tags":..}` with
    /// keys sorted at every level and no whitespace.
    #[default]
    SortedObject,

    /// The NIP-01 array `[0,pubkey,created_at,kind,tags,content]`.
    Nip01,
}

/// A Nostr event as exchanged with relays.
///
/// ```json
/// {
///   "id": "...",           // SHA-256 of the canonical form
///   "pubkey": "...",       // author public key, hex
///   "created_at": 123456,  // Unix timestamp, seconds
///   "kind": 1,
///   "tags": [["t", "..."]],
///   "content": "...",
///   "sig": "..."           // signature over the id-bearing canonical form
/// }
/// ```
///
/// Fields are public. After changing any of them call
/// [`Event::refresh_identifier`], which recomputes `id` and drops the now
/// stale signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Content-derived identifier (64 hex chars), empty until computed.
    pub id: String,

    /// Author public key, hex-encoded.
    pub pubkey: String,

    /// Unix timestamp when the event was created.
    pub created_at: i64,

    /// Event kind.
    pub kind: u16,

    /// Ordered tag arrays.
    pub tags: Vec<Vec<String>>,

    /// Event content.
    pub content: String,

    /// Hex signature, empty until signed.
    pub sig: String,
}

impl Event {
    /// Creates an event with empty `id` and `sig`.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_probe::nostr::Event;
    ///
    /// let event = Event::new("abc123", "hello", 1, vec![], 1_700_000_000);
    /// assert!(event.id.is_empty());
    /// assert!(event.sig.is_empty());
    /// ```
    #[must_use]
    pub fn new(
        pubkey: impl Into<String>,
        content: impl Into<String>,
        kind: u16,
        tags: Vec<Vec<String>>,
        created_at: i64,
    ) -> Self {
        Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags,
            content: content.into(),
            sig: String::new(),
        }
    }

    /// Serializes the identifier-bearing fields in the given canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Encoding`] if a field cannot be encoded.
    pub fn canonicalize(&self, form: CanonicalForm) -> Result<Vec<u8>> {
        let value = match form {
            CanonicalForm::SortedObject => json!({
                "pubkey": self.pubkey,
                "created_at": self.created_at,
                "kind": self.kind,
                "tags": self.tags,
                "content": self.content
            }),
            CanonicalForm::Nip01 => json!([
                0,
                self.pubkey,
                self.created_at,
                self.kind,
                self.tags,
                self.content
            ]),
        };
        canonical_json(&value).map(String::into_bytes)
    }

    /// Computes the hex SHA-256 identifier of the canonical form.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Encoding`] if canonicalization fails.
    pub fn compute_identifier(&self, form: CanonicalForm) -> Result<String> {
        let canonical = self.canonicalize(form)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Recomputes `id` from the current fields and clears `sig`.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Encoding`] if canonicalization fails.
    pub fn refresh_identifier(&mut self, form: CanonicalForm) -> Result<&str> {
        self.id = self.compute_identifier(form)?;
        self.sig.clear();
        Ok(&self.id)
    }

    /// Bytes handed to the signer: every field except `sig`, `id` included,
    /// as a sorted-key canonical object.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidEvent`] if `id` has not been computed, or
    /// [`NostrError::Encoding`] if canonicalization fails.
    pub fn signing_payload(&self) -> Result<Vec<u8>> {
        if self.id.is_empty() {
            return Err(NostrError::InvalidEvent(
                "identifier must be computed before signing".to_string(),
            ));
        }
        let value = json!({
            "id": self.id,
            "pubkey": self.pubkey,
            "created_at": self.created_at,
            "kind": self.kind,
            "tags": self.tags,
            "content": self.content
        });
        canonical_json(&value).map(String::into_bytes)
    }

    /// Obtains a signature from `signer` and stores it in `sig`.
    ///
    /// Signer failures are returned unchanged; nothing is retried.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is missing or the signer fails.
    pub fn sign<S: Signer + ?Sized>(&mut self, signer: &S) -> Result<&str> {
        let payload = self.signing_payload()?;
        self.sig = signer.sign(&payload)?;
        Ok(&self.sig)
    }

    /// Checks that `id` matches the current fields.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidEvent`] on mismatch.
    pub fn verify_identifier(&self, form: CanonicalForm) -> Result<()> {
        let calculated = self.compute_identifier(form)?;
        if calculated.as_bytes().ct_eq(self.id.as_bytes()).into() {
            Ok(())
        } else {
            Err(NostrError::InvalidEvent("Event ID mismatch".to_string()))
        }
    }

    /// Serializes this event to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(NostrError::from)
    }

    /// Deserializes an event from JSON. Key order is irrelevant.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(NostrError::from)
    }
}

/// Fluent construction of events ready to publish.
///
/// # Example
///
/// ```
/// use relay_probe::nostr::{CanonicalForm, EventBuilder, HmacTestSigner, TagBuilder};
///
/// let signer = HmacTestSigner::generate();
/// let event = EventBuilder::text_note("hello")
///     .tag(TagBuilder::t_tag("probe"))
///     .created_at(1_700_000_000)
///     .sign_with(&signer, CanonicalForm::SortedObject)
///     .unwrap();
/// assert_eq!(event.id.len(), 64);
/// assert!(!event.sig.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct EventBuilder {
    kind: u16,
    content: Vec<u8>,
    tags: Vec<Vec<String>>,
    created_at: Option<i64>,
}

impl EventBuilder {
    /// Starts an event of the given kind with empty content.
    #[must_use]
    pub const fn new(kind: u16) -> Self {
        Self {
            kind,
            content: Vec::new(),
            tags: Vec::new(),
            created_at: None,
        }
    }

    /// Starts a kind 1 text note.
    #[must_use]
    pub fn text_note(content: impl Into<String>) -> Self {
        Self::new(KIND_TEXT_NOTE).content(content)
    }

    /// Sets text content.
    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into().into_bytes();
        self
    }

    /// Sets content from raw bytes; building fails if they are not UTF-8.
    #[must_use]
    pub fn content_bytes(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.content = content.into();
        self
    }

    /// Appends a tag.
    #[must_use]
    pub fn tag(mut self, tag: Vec<String>) -> Self {
        self.tags.push(tag);
        self
    }

    /// Appends several tags in order.
    #[must_use]
    pub fn tags(mut self, tags: impl IntoIterator<Item = Vec<String>>) -> Self {
        self.tags.extend(tags);
        self
    }

    /// Fixes the creation timestamp; defaults to now.
    #[must_use]
    pub const fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds the event for `pubkey` with its identifier computed but unsigned.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Encoding`] if the content is not valid UTF-8.
    pub fn build(self, pubkey: &str, form: CanonicalForm) -> Result<Event> {
        let content = String::from_utf8(self.content)
            .map_err(|e| NostrError::Encoding(format!("content is not UTF-8: {e}")))?;
        let created_at = self.created_at.unwrap_or_else(|| Utc::now().timestamp());

        let mut event = Event::new(pubkey, content, self.kind, self.tags, created_at);
        event.refresh_identifier(form)?;
        Ok(event)
    }

    /// Builds, identifies and signs the event with `signer`'s key.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::Encoding`] for bad content or the signer's error.
    pub fn sign_with<S: Signer + ?Sized>(self, signer: &S, form: CanonicalForm) -> Result<Event> {
        let mut event = self.build(&signer.public_key_hex(), form)?;
        event.sign(signer)?;
        Ok(event)
    }
}
