//! Types describing the result of a probe run.

use crate::nostr::RelayMessage;
use crate::ws::{decode_frame_limited, Opcode};

use super::error::{RelayError, RelayResult};

/// Largest reply payload accepted from a relay.
pub const MAX_REPLY_PAYLOAD: usize = 1024 * 1024;

/// One frame received from the relay after the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayReply {
    /// A text frame holding a recognizable relay message.
    Message(RelayMessage),

    /// Any other frame: non-JSON text, binary, or control frames.
    Raw {
        /// Frame opcode.
        opcode: Opcode,
        /// Unmasked payload.
        payload: Vec<u8>,
    },
}

impl RelayReply {
    /// Decodes every complete frame at the front of `buffer`, removing the
    /// consumed bytes. Incomplete trailing bytes stay in the buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Protocol`] if a frame header is invalid or
    /// declares more than [`MAX_REPLY_PAYLOAD`] bytes.
    pub fn drain(buffer: &mut Vec<u8>) -> RelayResult<Vec<Self>> {
        let mut replies = Vec::new();
        let mut consumed = 0;

        while let Some((frame, used)) =
            decode_frame_limited(&buffer[consumed..], MAX_REPLY_PAYLOAD)
                .map_err(|e| RelayError::Protocol(e.to_string()))?
        {
            consumed += used;
            let reply = match frame.opcode {
                Opcode::Text => frame
                    .text()
                    .ok()
                    .and_then(|text| RelayMessage::from_json(text).ok())
                    .map_or_else(
                        || Self::Raw {
                            opcode: frame.opcode,
                            payload: frame.payload.clone(),
                        },
                        Self::Message,
                    ),
                opcode => Self::Raw {
                    opcode,
                    payload: frame.payload,
                },
            };
            replies.push(reply);
        }

        buffer.drain(..consumed);
        Ok(replies)
    }
}

/// What came back from the relay.
#[derive(Debug)]
pub enum ProbeOutcome {
    /// The relay answered with at least one frame.
    Response(Vec<RelayReply>),

    /// Nothing arrived within the timeout.
    NoResponse,

    /// The run aborted.
    Failed(RelayError),
}

/// Summary of a single probe run.
#[derive(Debug)]
pub struct ProbeReport {
    /// `host:port` that was probed.
    pub target: String,
    /// Handshake status code, if a response was parsed.
    pub handshake_status: Option<u16>,
    /// Id of the event that was published, once prepared.
    pub event_id: Option<String>,
    /// Number of envelopes written to the socket.
    pub messages_sent: usize,
    /// Final outcome.
    pub outcome: ProbeOutcome,
}

impl ProbeReport {
    /// Creates an empty report for `target`.
    #[must_use]
    pub const fn new(target: String) -> Self {
        Self {
            target,
            handshake_status: None,
            event_id: None,
            messages_sent: 0,
            outcome: ProbeOutcome::NoResponse,
        }
    }

    /// Returns true unless the run aborted with an error.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        !matches!(self.outcome, ProbeOutcome::Failed(_))
    }

    /// Relay messages received, skipping raw frames.
    #[must_use]
    pub fn messages(&self) -> Vec<&RelayMessage> {
        match &self.outcome {
            ProbeOutcome::Response(replies) => replies
                .iter()
                .filter_map(|reply| match reply {
                    RelayReply::Message(msg) => Some(msg),
                    RelayReply::Raw { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// The relay's verdict on the published event, if an `OK` for it arrived.
    #[must_use]
    pub fn accepted(&self) -> Option<bool> {
        let event_id = self.event_id.as_deref()?;
        self.messages().into_iter().find_map(|msg| match msg {
            RelayMessage::Ok {
                event_id: id,
                accepted,
                ..
            } if id == event_id => Some(*accepted),
            _ => None,
        })
    }

    /// The error that aborted the run, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&RelayError> {
        match &self.outcome {
            ProbeOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}
