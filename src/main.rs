//! Relay Probe - publishes one signed note to a local relay and logs the reply.
//!
//! Runs the blocking probe, then the async probe, both with the default
//! config. Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use relay_probe::{ProbeConfig, ProbeReport, RelayProbe};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let probe = match RelayProbe::new(ProbeConfig::default()) {
        Ok(probe) => Arc::new(probe),
        Err(e) => {
            tracing::error!(error = %e, "invalid probe configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(pubkey = %probe.public_key_hex(), "probe identity");

    // The blocking runner stays off the async worker threads.
    let blocking = {
        let probe = Arc::clone(&probe);
        match tokio::task::spawn_blocking(move || probe.run()).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "blocking probe panicked");
                None
            }
        }
    };
    let nonblocking = probe.run_async().await;

    let reports: Vec<&ProbeReport> = blocking.iter().chain(Some(&nonblocking)).collect();
    for report in &reports {
        tracing::info!(
            target_addr = %report.target,
            handshake = ?report.handshake_status,
            event_id = report.event_id.as_deref().unwrap_or("-"),
            sent = report.messages_sent,
            accepted = ?report.accepted(),
            completed = report.is_completed(),
            "probe finished"
        );
    }

    if reports.iter().any(|r| r.is_completed()) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
