//! Outbox relay: at-least-once delivery of queued ban events.
//!
//! ```text
//! ledger outbox ──pending──▶ OutboxRelay ──POST + Idempotency-Key──▶ sink
//!        ▲                        │
//!        └── mark delivered ◀── 2xx
//! ```
//!
//! An entry is marked delivered only after the sink accepted it. A crash
//! between acceptance and marking re-sends the same event with the same key,
//! which consumers dedupe on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{RelayConfig, RetryPolicy};
use crate::error::{DeliveryError, LedgerResult};
use crate::events::{ModerationEvent, SharedEventBus};
use crate::ledger::{BanEvent, OutboxEntry, SharedLedger};

/// Downstream consumer of ban events (refund, notification).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BanEventSink: Send + Sync {
    async fn deliver(&self, event: &BanEvent) -> Result<(), DeliveryError>;
}

/// POSTs the event as JSON with an `Idempotency-Key` header.
pub struct WebhookSink {
    url: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BanEventSink for WebhookSink {
    async fn deliver(&self, event: &BanEvent) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", &event.idempotency_key)
            .json(event)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(url = %self.url, status = status.as_u16(), "Webhook accepted ban event");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(DeliveryError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

/// Counts from one pass over the outbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct OutboxRelay {
    ledger: SharedLedger,
    sink: Arc<dyn BanEventSink>,
    config: RelayConfig,
    retry: RetryPolicy,
    events: Option<SharedEventBus>,
}

impl OutboxRelay {
    pub fn new(ledger: SharedLedger, sink: Arc<dyn BanEventSink>, config: RelayConfig) -> Self {
        let retry = RetryPolicy {
            max_retries: config.max_delivery_attempts.saturating_sub(1),
            ..RetryPolicy::default()
        };
        Self {
            ledger,
            sink,
            config,
            retry,
            events: None,
        }
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Override the per-pass backoff between attempts.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Try every pending entry once (with in-pass retries). Ledger errors
    /// abort the pass; sink errors leave the entry pending.
    pub async fn run_once(&self) -> LedgerResult<RelayReport> {
        let pending = self.ledger.pending_ban_events().await?;
        let mut report = RelayReport::default();

        if pending.is_empty() {
            return Ok(report);
        }
        debug!(pending = pending.len(), "Relaying queued ban events");

        for entry in pending {
            if self.deliver_entry(&entry).await? {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        if report.failed > 0 {
            warn!(
                delivered = report.delivered,
                failed = report.failed,
                "Some ban events remain undelivered"
            );
        } else {
            info!(delivered = report.delivered, "Outbox drained");
        }
        Ok(report)
    }

    async fn deliver_entry(&self, entry: &OutboxEntry) -> LedgerResult<bool> {
        let key = &entry.event.idempotency_key;
        let mut retries_spent = 0u32;
        let mut attempts = entry.delivery_attempts;

        loop {
            self.ledger.record_delivery_attempt(key).await?;
            attempts += 1;

            match self.sink.deliver(&entry.event).await {
                Ok(()) => {
                    self.ledger.mark_ban_event_delivered(key).await?;
                    info!(
                        identity_id = %entry.event.identity_id,
                        idempotency_key = %key,
                        attempts,
                        "Ban event delivered"
                    );
                    if let Some(ref bus) = self.events {
                        bus.publish(ModerationEvent::BanEventDelivered {
                            identity_id: entry.event.identity_id.clone(),
                            idempotency_key: key.clone(),
                            attempts,
                            timestamp: Utc::now(),
                        });
                    }
                    return Ok(true);
                }
                Err(e) => {
                    if !self.retry.should_retry(retries_spent) {
                        error!(
                            identity_id = %entry.event.identity_id,
                            idempotency_key = %key,
                            attempts,
                            error = %e,
                            "Ban event delivery failed; leaving it queued"
                        );
                        return Ok(false);
                    }
                    retries_spent += 1;
                    let backoff = self.retry.backoff_duration(retries_spent);
                    warn!(
                        idempotency_key = %key,
                        attempt = retries_spent,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Ban event delivery failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    /// Poll the outbox every `poll_interval` until `cancel` fires.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval());
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Outbox relay stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!(error = %e, "Outbox relay pass failed");
                        }
                    }
                }
            }
        })
    }
}
