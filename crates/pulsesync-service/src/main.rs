//! pulsesyncd - latency-compensated trigger-to-light daemon

#![deny(clippy::unwrap_used)]

use anyhow::{Context, Result};
use clap::Parser;
use pulsesync_service::{Cli, PulseDaemon, ServiceConfig};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    info!("Starting pulsesyncd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ServiceConfig::default(),
    };
    cli.apply_to(&mut config);

    let daemon = PulseDaemon::start(config).context("Failed to start daemon")?;
    let report = daemon
        .run(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for Ctrl-C, shutting down");
            }
        })
        .await
        .context("Daemon error")?;

    info!(
        dispatched = report.dispatch.dispatched,
        failed = report.dispatch.failed,
        demo_triggers = report.demo_submitted,
        "Service stopped"
    );
    Ok(())
}
