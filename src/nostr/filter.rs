//! Subscription filters carried by `REQ` envelopes.

use serde::{Deserialize, Serialize};

/// A NIP-01 subscription filter.
///
/// Unset fields are omitted from the JSON, so `Filter::new().kinds([1])`
/// serializes to `{"kinds":[1]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    /// Author public keys to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    /// Event kinds to match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// Lower bound on `created_at`, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<i64>,

    /// Upper bound on `created_at`, inclusive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<i64>,

    /// Maximum number of stored events to return.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Filter {
    /// Creates an empty filter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to the given event ids.
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to the given authors.
    #[must_use]
    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    /// Restricts to the given kinds.
    #[must_use]
    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Sets the `since` bound.
    #[must_use]
    pub const fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the `until` bound.
    #[must_use]
    pub const fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    /// Sets the result limit.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
