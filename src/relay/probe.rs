//! The probe run: handshake, `REQ`, signed `EVENT`, one wait for a reply.

use tracing::{debug, info, warn};

use crate::nostr::{ClientMessage, Event, EventBuilder, Filter, Signer, TagBuilder};
use crate::ws::{encode_frame, UpgradeRequest};

use super::async_connection::AsyncRelayConnection;
use super::config::ProbeConfig;
use super::connection::RelayConnection;
use super::error::{RelayError, RelayResult};
use super::types::{ProbeOutcome, ProbeReport, RelayReply};

/// Everything a run sends, prepared before any socket is opened.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    /// The signed event.
    pub event: Event,
    /// Envelopes in send order: `REQ` then `EVENT`.
    pub messages: Vec<ClientMessage>,
    /// Masked frames, one per message.
    pub frames: Vec<Vec<u8>>,
}

/// Publishes one event to a relay and records what comes back.
pub struct RelayProbe {
    config: ProbeConfig,
    signer: Box<dyn Signer + Send + Sync>,
}

impl std::fmt::Debug for RelayProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayProbe")
            .field("config", &self.config)
            .field("pubkey", &self.signer.public_key_hex())
            .finish()
    }
}

impl RelayProbe {
    /// Creates a probe, building the signer from the config.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the config is invalid or the
    /// credential is not a usable key.
    pub fn new(config: ProbeConfig) -> RelayResult<Self> {
        config.validate()?;
        let signer = config.signer()?;
        Ok(Self { config, signer })
    }

    /// Creates a probe with a caller-supplied signer. `signing` and
    /// `author_credential` in the config are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the config is invalid.
    pub fn with_signer(
        config: ProbeConfig,
        signer: Box<dyn Signer + Send + Sync>,
    ) -> RelayResult<Self> {
        config.validate()?;
        Ok(Self { config, signer })
    }

    /// The probe's configuration.
    #[must_use]
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Public identifier events are authored under.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        self.signer.public_key_hex()
    }

    /// Builds, signs, and frames the `REQ` and `EVENT` envelopes.
    ///
    /// Nothing touches the network here, so an encoding or signing failure
    /// means nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Signing`] if the signer fails and
    /// [`RelayError::Encoding`] if an envelope cannot be encoded or framed.
    pub fn prepare(&self) -> RelayResult<ProbePlan> {
        let event = EventBuilder::new(self.config.kind)
            .content(self.config.content.clone())
            .tags(self.config.hashtags.iter().map(|t| TagBuilder::t_tag(t)))
            .sign_with(&*self.signer, self.config.canonical_form)?;

        let messages = vec![
            ClientMessage::req(
                self.config.subscription_id.clone(),
                Filter::new().kinds([self.config.kind]),
            ),
            ClientMessage::event(event.clone()),
        ];

        let frames = messages
            .iter()
            .map(|msg| -> RelayResult<Vec<u8>> { Ok(encode_frame(&msg.to_json()?)?) })
            .collect::<RelayResult<Vec<_>>>()?;

        debug!(
            event_id = %event.id,
            pubkey = %event.pubkey,
            frames = frames.len(),
            "Probe plan prepared"
        );
        Ok(ProbePlan {
            event,
            messages,
            frames,
        })
    }

    /// Runs the probe on the calling thread.
    ///
    /// Never fails: errors end up in [`ProbeOutcome::Failed`].
    pub fn run(&self) -> ProbeReport {
        let mut report = ProbeReport::new(self.config.addr());
        info!(host = %self.config.host, port = self.config.port, "Starting blocking probe");

        report.outcome = self
            .run_blocking(&mut report)
            .unwrap_or_else(ProbeOutcome::Failed);
        log_report(&report);
        report
    }

    /// Runs the probe on the tokio runtime.
    ///
    /// Never fails: errors end up in [`ProbeOutcome::Failed`].
    pub async fn run_async(&self) -> ProbeReport {
        let mut report = ProbeReport::new(self.config.addr());
        info!(host = %self.config.host, port = self.config.port, "Starting async probe");

        report.outcome = self
            .run_nonblocking(&mut report)
            .await
            .unwrap_or_else(ProbeOutcome::Failed);
        log_report(&report);
        report
    }

    fn run_blocking(&self, report: &mut ProbeReport) -> RelayResult<ProbeOutcome> {
        let plan = self.prepare()?;
        report.event_id = Some(plan.event.id.clone());

        let mut conn = RelayConnection::open(&self.config)?;
        let request = self.upgrade_request();
        let response = conn.upgrade(&request)?;
        report.handshake_status = Some(response.status);
        response
            .validate(&request)
            .map_err(|source| RelayError::Handshake {
                addr: conn.addr().to_string(),
                source,
            })?;

        for frame in &plan.frames {
            conn.send_frame(frame)?;
            report.messages_sent += 1;
        }

        settle(conn.read_replies())
    }

    async fn run_nonblocking(&self, report: &mut ProbeReport) -> RelayResult<ProbeOutcome> {
        let plan = self.prepare()?;
        report.event_id = Some(plan.event.id.clone());

        let mut conn = AsyncRelayConnection::open(&self.config).await?;
        let request = self.upgrade_request();
        let response = conn.upgrade(&request).await?;
        report.handshake_status = Some(response.status);
        response
            .validate(&request)
            .map_err(|source| RelayError::Handshake {
                addr: conn.addr().to_string(),
                source,
            })?;

        for frame in &plan.frames {
            conn.send_frame(frame).await?;
            report.messages_sent += 1;
        }

        let outcome = settle(conn.read_replies().await);
        conn.close().await;
        outcome
    }

    fn upgrade_request(&self) -> UpgradeRequest {
        UpgradeRequest::new(&self.config.host, self.config.port, &self.config.path)
    }
}

// A reply timeout is an answer, not a failure.
fn settle(replies: RelayResult<Vec<RelayReply>>) -> RelayResult<ProbeOutcome> {
    match replies {
        Ok(replies) => Ok(ProbeOutcome::Response(replies)),
        Err(RelayError::Timeout(what)) => {
            debug!(waiting_for = %what, "No reply before timeout");
            Ok(ProbeOutcome::NoResponse)
        }
        Err(e) => Err(e),
    }
}

fn log_report(report: &ProbeReport) {
    let event_id = report.event_id.as_deref().unwrap_or("-");
    match &report.outcome {
        ProbeOutcome::Response(replies) => {
            for reply in replies {
                match reply {
                    RelayReply::Message(msg) => {
                        info!(target_addr = %report.target, event_id, reply = ?msg, "Relay replied");
                    }
                    RelayReply::Raw { opcode, payload } => {
                        info!(
                            target_addr = %report.target,
                            ?opcode,
                            payload = %String::from_utf8_lossy(payload),
                            "Relay sent unrecognized frame"
                        );
                    }
                }
            }
        }
        ProbeOutcome::NoResponse => {
            info!(target_addr = %report.target, event_id, sent = report.messages_sent, "No response from relay");
        }
        ProbeOutcome::Failed(e) => {
            warn!(target_addr = %report.target, event_id, error = %e, "Probe failed");
        }
    }
}
