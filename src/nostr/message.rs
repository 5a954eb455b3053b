//! Wire envelopes exchanged with a relay.
//!
//! Client to relay:
//! - `["EVENT", event]`
//! - `["REQ", subscription_id, filter, ...]`
//! - `["CLOSE", subscription_id]`
//!
//! Relay to client:
//! - `["OK", event_id, accepted, message]`
//! - `["NOTICE", message]`
//! - `["EVENT", subscription_id, event]`
//! - `["EOSE", subscription_id]`
//! - `["CLOSED", subscription_id, message]`

use serde_json::{json, Value};

use crate::nostr::error::{NostrError, Result};
use crate::nostr::event::Event;
use crate::nostr::filter::Filter;

/// A message sent from client to relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Publish an event.
    Event(Box<Event>),

    /// Open a subscription.
    Req {
        /// Client-chosen subscription id.
        subscription_id: String,
        /// Filters; an event matching any of them is sent.
        filters: Vec<Filter>,
    },

    /// Close a subscription.
    Close(String),
}

impl ClientMessage {
    /// Wraps an event: `["EVENT", event]`.
    #[must_use]
    pub fn event(event: Event) -> Self {
        Self::Event(Box::new(event))
    }

    /// Builds a single-filter subscription: `["REQ", id, filter]`.
    #[must_use]
    pub fn req(subscription_id: impl Into<String>, filter: Filter) -> Self {
        Self::Req {
            subscription_id: subscription_id.into(),
            filters: vec![filter],
        }
    }

    /// Builds a subscription with several filters.
    #[must_use]
    pub fn req_many(subscription_id: impl Into<String>, filters: Vec<Filter>) -> Self {
        Self::Req {
            subscription_id: subscription_id.into(),
            filters,
        }
    }

    /// Closes a subscription: `["CLOSE", id]`.
    #[must_use]
    pub fn close(subscription_id: impl Into<String>) -> Self {
        Self::Close(subscription_id.into())
    }

    /// The envelope type string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Event(_) => "EVENT",
            Self::Req { .. } => "REQ",
            Self::Close(_) => "CLOSE",
        }
    }

    /// Converts to the JSON array sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if a component cannot be serialized.
    pub fn to_value(&self) -> Result<Value> {
        let value = match self {
            Self::Event(event) => json!(["EVENT", serde_json::to_value(event.as_ref())?]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut items = vec![json!("REQ"), json!(subscription_id)];
                for filter in filters {
                    items.push(serde_json::to_value(filter)?);
                }
                Value::Array(items)
            }
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
        };
        Ok(value)
    }

    /// Serializes to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    ///
    /// # Example
    ///
    /// ```
    /// use relay_probe::nostr::{ClientMessage, Filter};
    ///
    /// let req = ClientMessage::req("test-sub", Filter::new().kinds([1]));
    /// assert_eq!(req.to_json().unwrap(), r#"["REQ","test-sub",{"kinds":[1]}]"#);
    /// ```
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }

    /// Parses a client message, as a relay would.
    ///
    /// # Errors
    ///
    /// Returns [`NostrError::InvalidMessage`] for unknown or malformed envelopes.
    pub fn from_json(json: &str) -> Result<Self> {
        let items: Vec<Value> = serde_json::from_str(json)?;
        let (kind, rest) = split_kind(&items)?;

        match kind {
            "EVENT" => {
                let event = rest
                    .first()
                    .ok_or_else(|| NostrError::InvalidMessage("EVENT without event".to_string()))?;
                Ok(Self::event(serde_json::from_value(event.clone())?))
            }
            "REQ" => {
                let subscription_id = string_at(rest, 0, "REQ subscription id")?;
                let filters = rest[1..]
                    .iter()
                    .map(|f| serde_json::from_value(f.clone()))
                    .collect::<std::result::Result<Vec<Filter>, _>>()?;
                Ok(Self::Req {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(Self::Close(string_at(rest, 0, "CLOSE subscription id")?)),
            other => Err(NostrError::InvalidMessage(format!(
                "unknown client message type: {other}"
            ))),
        }
    }
}

/// A message sent from relay to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Result of publishing an event.
    Ok {
        /// Id of the event this answers.
        event_id: String,
        /// Whether the relay stored the event.
        accepted: bool,
        /// Human-readable reason, often prefixed like `blocked:`.
        message: String,
    },

    /// Free-form notice.
    Notice(String),

    /// An event matching a subscription.
    Event {
        /// Subscription the event belongs to.
        subscription_id: String,
        /// The event.
        event: Box<Event>,
    },

    /// End of stored events for a subscription.
    Eose(String),

    /// The relay closed a subscription.
    Closed {
        /// Subscription that was closed.
        subscription_id: String,
        /// Reason.
        message: String,
    },

    /// A well-formed array with an unrecognized type.
    Unknown(Value),
}

impl RelayMessage {
    /// Parses a relay message.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array starting with a string
    /// or a known message is missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        let items: Vec<Value> = serde_json::from_str(json)?;
        let (kind, rest) = split_kind(&items)?;

        match kind {
            "OK" => Ok(Self::Ok {
                event_id: string_at(rest, 0, "OK event id")?,
                accepted: rest.get(1).and_then(Value::as_bool).ok_or_else(|| {
                    NostrError::InvalidMessage("OK without accepted flag".to_string())
                })?,
                message: rest
                    .get(2)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            "NOTICE" => Ok(Self::Notice(string_at(rest, 0, "NOTICE message")?)),
            "EVENT" => {
                let subscription_id = string_at(rest, 0, "EVENT subscription id")?;
                let event = rest
                    .get(1)
                    .ok_or_else(|| NostrError::InvalidMessage("EVENT without event".to_string()))?;
                Ok(Self::Event {
                    subscription_id,
                    event: Box::new(serde_json::from_value(event.clone())?),
                })
            }
            "EOSE" => Ok(Self::Eose(string_at(rest, 0, "EOSE subscription id")?)),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: string_at(rest, 0, "CLOSED subscription id")?,
                message: rest
                    .get(1)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            _ => Ok(Self::Unknown(Value::Array(items))),
        }
    }

    /// Serializes to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let value = match self {
            Self::Ok {
                event_id,
                accepted,
                message,
            } => json!(["OK", event_id, accepted, message]),
            Self::Notice(message) => json!(["NOTICE", message]),
            Self::Event {
                subscription_id,
                event,
            } => json!([
                "EVENT",
                subscription_id,
                serde_json::to_value(event.as_ref())?
            ]),
            Self::Eose(subscription_id) => json!(["EOSE", subscription_id]),
            Self::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            Self::Unknown(value) => value.clone(),
        };
        Ok(serde_json::to_string(&value)?)
    }
}

fn split_kind(items: &[Value]) -> Result<(&str, &[Value])> {
    let (first, rest) = items
        .split_first()
        .ok_or_else(|| NostrError::InvalidMessage("empty array".to_string()))?;
    let kind = first
        .as_str()
        .ok_or_else(|| NostrError::InvalidMessage("message type is not a string".to_string()))?;
    Ok((kind, rest))
}

fn string_at(items: &[Value], index: usize, what: &str) -> Result<String> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| NostrError::InvalidMessage(format!("missing {what}")))
}
