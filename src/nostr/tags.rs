//! Tag builders for Nostr events.

/// Builder for Nostr event tags.
///
/// # Example
///
/// ```
/// use relay_probe::nostr::TagBuilder;
///
/// let tag = TagBuilder::t_tag("relay-probe");
/// assert_eq!(tag, vec!["t", "relay-probe"]);
/// ```
pub struct TagBuilder;

impl TagBuilder {
    /// Builds a `t` hashtag. Hashtags are lowercased.
    #[must_use]
    pub fn t_tag(hashtag: &str) -> Vec<String> {
        vec!["t".to_string(), hashtag.to_lowercase()]
    }
}
