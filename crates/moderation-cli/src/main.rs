//! Operator CLI for the content enforcement engine
//!
//! Wires the `enforcement` library to HTTP classifier endpoints, a RocksDB
//! ledger and a webhook ban-event sink.
//!
//! # Usage
//!
//! ```bash
//! # Moderate a post
//! moderation-cli --config moderation.toml submit --identity user-42 --content "..."
//!
//! # Moderate a direct message under its stricter policy
//! moderation-cli --config moderation.toml submit --identity user-42 --channel direct_messages
//!
//! # Inspect an identity
//! moderation-cli status --identity user-42
//! moderation-cli violations --identity user-42
//!
//! # Deliver queued ban events
//! MODERATION_WEBHOOK_URL=https://refunds.internal/bans moderation-cli relay
//! ```

mod cli;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use enforcement::{
    EngineConfig, EventBus, IdentityId, ModerationService, OutboxRelay, PolicyClassifier,
    RocksLedger, SanctionState, SharedLedger, ViolationLedger, WebhookSink,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use cli::{Args, Command};

/// Ledger directory used when neither flag, env nor config names one.
const DEFAULT_LEDGER_DIR: &str = ".moderation-ledger";

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    config.apply_env();
    if let Some(path) = &args.ledger_path {
        config.ledger_path = Some(path.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_ledger(config: &EngineConfig) -> Result<Arc<RocksLedger>> {
    let path = config
        .ledger_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_DIR));
    let ledger = RocksLedger::open(&path)
        .map_err(|e| anyhow::anyhow!("Failed to open ledger at {}: {}", path.display(), e))?;
    Ok(ledger.shared())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Error shape printed for failed submissions.
#[derive(Serialize)]
struct SubmitFailure<'a> {
    allowed: bool,
    error: &'a str,
}

async fn submit(
    config: &EngineConfig,
    ledger: SharedLedger,
    identity: String,
    content: Option<String>,
    channel: Option<String>,
) -> Result<()> {
    let content = match content {
        Some(content) => content,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read content from stdin")?;
            buf
        }
    };

    if config.classifier.endpoints.is_empty() {
        warn!("No classifier endpoints configured; every submission will fail open");
    }
    let classifier = PolicyClassifier::from_config(config.classifier.clone())
        .context("Failed to build classifier providers")?;
    let service =
        ModerationService::new(ledger, classifier, config).with_events(EventBus::new().shared());

    let identity = IdentityId::from(identity);
    let result = match channel.as_deref() {
        Some(channel) => service.submit_in_channel(channel, &content, &identity).await,
        None => service.submit_for_moderation(&content, &identity).await,
    };
    match result {
        Ok(outcome) => print_json(&outcome),
        Err(e) => {
            print_json(&SubmitFailure {
                allowed: false,
                error: e.user_message(),
            })?;
            Err(anyhow::Error::new(e).context(format!("Submission for {identity} failed")))
        }
    }
}

async fn relay(config: &EngineConfig, ledger: SharedLedger, once: bool) -> Result<()> {
    let url = config
        .relay
        .webhook_url
        .clone()
        .context("No webhook configured (set relay.webhook_url or MODERATION_WEBHOOK_URL)")?;
    let sink = WebhookSink::new(
        url.clone(),
        std::time::Duration::from_millis(config.relay.timeout_ms),
    )?;
    let relay = OutboxRelay::new(ledger, Arc::new(sink), config.relay.clone());

    if once {
        let report = relay.run_once().await?;
        info!(delivered = report.delivered, failed = report.failed, "Relay pass complete");
        if report.failed > 0 {
            anyhow::bail!("{} ban event(s) could not be delivered", report.failed);
        }
        return Ok(());
    }

    info!(%url, poll_ms = config.relay.poll_interval_ms, "Starting outbox relay");
    let cancel = CancellationToken::new();
    let handle = Arc::new(relay).spawn(cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested");
    cancel.cancel();
    handle.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("moderation_cli=info".parse()?)
                .add_directive("enforcement=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    let ledger = open_ledger(&config)?;

    match args.command {
        Command::Submit {
            identity,
            content,
            channel,
        } => submit(&config, ledger, identity, content, channel).await,
        Command::Status { identity } => {
            let identity = IdentityId::from(identity);
            let stored = ledger.sanction_state(&identity).await?;
            print_json(&stored.unwrap_or_else(|| SanctionState::clean(identity)))
        }
        Command::Violations { identity } => {
            let records = ledger.violations(&IdentityId::from(identity)).await?;
            print_json(&records)
        }
        Command::Relay { once } => relay(&config, ledger, once).await,
    }
}
