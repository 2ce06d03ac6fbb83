//! Enforcement Action Emitter
//!
//! Persists the ban and hands one keyed "ban occurred" event to the durable
//! outbox. Delivery to refund and notification consumers happens later in
//! [`crate::relay`], at least once, deduplicated downstream by
//! `idempotency_key`.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::EscalationConfig;
use crate::error::EnforcementResult;
use crate::events::{ModerationEvent, SharedEventBus};
use crate::ledger::{BanEvent, IdentityId, SharedLedger};

pub struct EnforcementEmitter {
    ledger: SharedLedger,
    ban_threshold: u32,
    events: Option<SharedEventBus>,
}

impl EnforcementEmitter {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            ban_threshold: EscalationConfig::default().ban_threshold,
            events: None,
        }
    }

    /// Strikes an identity must hold before a ban is accepted.
    pub fn with_ban_threshold(mut self, ban_threshold: u32) -> Self {
        self.ban_threshold = ban_threshold;
        self
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Ban `identity_id` and queue its outbound event.
    ///
    /// Safe to call any number of times for the same ban: the upsert keeps
    /// the first stored ban, and the event key is derived from the stored
    /// `banned_at`, so repeats resolve to the same outbox entry.
    ///
    /// Fails without touching the outbox when the identity has not reached
    /// the ban threshold.
    pub async fn enforce_ban(
        &self,
        identity_id: &IdentityId,
        reason: &str,
        banned_at: DateTime<Utc>,
    ) -> EnforcementResult<BanEvent> {
        let state = self
            .ledger
            .upsert_ban(identity_id, reason, banned_at, self.ban_threshold)
            .await?;

        let event = BanEvent::new(
            identity_id.clone(),
            state.ban_reason.as_deref().unwrap_or(reason),
            state.banned_at.unwrap_or(banned_at),
        );

        let created = self.ledger.enqueue_ban_event(event.clone()).await?;
        if created {
            info!(
                %identity_id,
                idempotency_key = %event.idempotency_key,
                "Ban event queued for delivery"
            );
        } else {
            debug!(
                %identity_id,
                idempotency_key = %event.idempotency_key,
                "Ban event already queued"
            );
        }

        if let Some(ref bus) = self.events {
            bus.publish(ModerationEvent::BanEnforced {
                identity_id: identity_id.clone(),
                idempotency_key: event.idempotency_key.clone(),
                timestamp: Utc::now(),
            });
        }

        Ok(event)
    }
}
