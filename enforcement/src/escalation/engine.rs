//! Escalation Engine: one confirmed violation, one atomic strike.
//!
//! Every attempt re-reads the ledger, re-checks the ban flag, and issues a
//! single conditional commit keyed on the `warning_count` it read. A lost
//! race restarts from the read. The commit that crosses the ban threshold
//! carries the ban fields and the outbox entry, so at most one attempt per
//! identity can ever produce a ban.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::messages::MessageTemplates;
use super::tier::{OutcomeTier, SanctionTier};
use crate::classifier::ClassificationResult;
use crate::config::EscalationConfig;
use crate::emitter::EnforcementEmitter;
use crate::error::{EnforcementError, EnforcementResult};
use crate::events::{ModerationEvent, SharedEventBus};
use crate::ledger::{
    BanEvent, CommitResult, IdentityId, SanctionState, SharedLedger, ViolationCommit,
    ViolationRecord,
};

/// Result of feeding one confirmed violation through the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EscalationDecision {
    /// Strike recorded below the ban threshold.
    Warned {
        tier: SanctionTier,
        warning_number: u32,
        record_id: Uuid,
        message: String,
    },
    /// Strike recorded and it was the one that banned the identity.
    Banned {
        warning_number: u32,
        record_id: Uuid,
        event: BanEvent,
        message: String,
    },
    /// The identity was banned before this strike could land. Nothing written.
    AlreadyBanned { reason: Option<String> },
}

impl EscalationDecision {
    pub fn tier(&self) -> SanctionTier {
        match self {
            Self::Warned { tier, .. } => *tier,
            Self::Banned { .. } | Self::AlreadyBanned { .. } => SanctionTier::Banned,
        }
    }

    pub fn outcome_tier(&self) -> Option<OutcomeTier> {
        self.tier().outcome_tier()
    }

    /// Number of the strike this decision recorded, if it recorded one.
    pub fn warning_number(&self) -> Option<u32> {
        match self {
            Self::Warned { warning_number, .. } | Self::Banned { warning_number, .. } => {
                Some(*warning_number)
            }
            Self::AlreadyBanned { .. } => None,
        }
    }
}

/// The escalation state machine over the ledger
pub struct EscalationEngine {
    ledger: SharedLedger,
    emitter: EnforcementEmitter,
    config: EscalationConfig,
    messages: MessageTemplates,
    events: Option<SharedEventBus>,
}

impl EscalationEngine {
    /// Create a new engine with default config and messages
    pub fn new(ledger: SharedLedger) -> Self {
        Self::with_config(ledger, EscalationConfig::default(), MessageTemplates::default())
    }

    pub fn with_config(
        ledger: SharedLedger,
        config: EscalationConfig,
        messages: MessageTemplates,
    ) -> Self {
        Self {
            emitter: EnforcementEmitter::new(ledger.clone())
                .with_ban_threshold(config.ban_threshold),
            ledger,
            config,
            messages,
            events: None,
        }
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.emitter = EnforcementEmitter::new(self.ledger.clone())
            .with_ban_threshold(self.config.ban_threshold)
            .with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    pub fn messages(&self) -> &MessageTemplates {
        &self.messages
    }

    /// Record one confirmed violation and move the identity along the ladder.
    ///
    /// Callers only pass verdicts that already count as violations; this
    /// method does not look at `is_violation` or `confidence`.
    pub async fn record_violation(
        &self,
        identity_id: &IdentityId,
        content: &str,
        verdict: &ClassificationResult,
    ) -> EnforcementResult<EscalationDecision> {
        let max_attempts = self.config.max_commit_attempts;

        for attempt in 1..=max_attempts {
            let state = self
                .ledger
                .sanction_state(identity_id)
                .await?
                .unwrap_or_else(|| SanctionState::clean(identity_id.clone()));

            if state.is_banned {
                debug!(%identity_id, attempt, "Identity already banned; no strike recorded");
                return Ok(EscalationDecision::AlreadyBanned {
                    reason: state.ban_reason,
                });
            }

            let expected = state.warning_count;
            let next = expected.saturating_add(1);
            let tier = SanctionTier::from_count(next, self.config.ban_threshold);

            if expected >= self.config.ban_threshold {
                warn!(
                    %identity_id,
                    warning_count = expected,
                    ban_threshold = self.config.ban_threshold,
                    "Unbanned identity at or past the ban threshold; banning on this strike"
                );
            }

            let record = ViolationRecord::new(
                identity_id.clone(),
                content,
                verdict.reason.clone(),
                verdict.severity,
                next,
            );
            let record_id = record.id;
            let ban = tier
                .is_banned()
                .then(|| BanEvent::new(identity_id.clone(), verdict.reason.clone(), record.created_at));

            let commit = ViolationCommit {
                identity_id: identity_id.clone(),
                expected_warning_count: expected,
                record,
                ban: ban.clone(),
            };

            match self.ledger.commit_violation(commit).await? {
                CommitResult::Committed(_) => {
                    info!(
                        %identity_id,
                        warning_number = next,
                        tier = %tier,
                        severity = %verdict.severity,
                        attempt,
                        "Violation recorded"
                    );
                    self.publish(ModerationEvent::ViolationRecorded {
                        identity_id: identity_id.clone(),
                        record_id,
                        warning_number: next,
                        severity: verdict.severity,
                        timestamp: Utc::now(),
                    });

                    return match ban {
                        Some(ban) => {
                            let event = self
                                .emitter
                                .enforce_ban(identity_id, &ban.reason, ban.banned_at)
                                .await?;
                            Ok(EscalationDecision::Banned {
                                warning_number: next,
                                record_id,
                                event,
                                message: self.render(SanctionTier::Banned, &verdict.reason),
                            })
                        }
                        None => Ok(EscalationDecision::Warned {
                            tier,
                            warning_number: next,
                            record_id,
                            message: self.render(tier, &verdict.reason),
                        }),
                    };
                }
                CommitResult::Conflict { current } => {
                    debug!(
                        %identity_id,
                        attempt,
                        expected,
                        observed = current.warning_count,
                        observed_banned = current.is_banned,
                        "Commit conflict; re-reading sanction state"
                    );
                    self.publish(ModerationEvent::CommitConflict {
                        identity_id: identity_id.clone(),
                        attempt,
                        observed_warning_count: current.warning_count,
                        timestamp: Utc::now(),
                    });
                    tokio::task::yield_now().await;
                }
            }
        }

        warn!(
            %identity_id,
            attempts = max_attempts,
            "Commit retries exhausted; surfacing failure"
        );
        Err(EnforcementError::ConflictRetriesExhausted {
            identity_id: identity_id.to_string(),
            attempts: max_attempts,
        })
    }

    fn render(&self, tier: SanctionTier, reason: &str) -> String {
        self.messages.render(tier, reason).unwrap_or_default()
    }

    fn publish(&self, event: ModerationEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::DateTime;

    use super::*;
    use crate::classifier::Severity;
    use crate::error::LedgerResult;
    use crate::events::EventBus;
    use crate::ledger::{InMemoryLedger, OutboxEntry, ViolationLedger};

    fn verdict(reason: &str) -> ClassificationResult {
        ClassificationResult {
            is_violation: true,
            severity: Severity::Medium,
            reason: reason.to_string(),
            confidence: 0.9,
        }
    }

    /// Ledger whose conditional writes always lose, as if another writer
    /// always got there first.
    struct AlwaysConflicting {
        inner: InMemoryLedger,
        commits: AtomicU32,
    }

    #[async_trait]
    impl ViolationLedger for AlwaysConflicting {
        async fn sanction_state(&self, id: &IdentityId) -> LedgerResult<Option<SanctionState>> {
            self.inner.sanction_state(id).await
        }
        async fn commit_violation(&self, commit: ViolationCommit) -> LedgerResult<CommitResult> {
            let n = self.commits.fetch_add(1, Ordering::SeqCst);
            let mut current = SanctionState::clean(commit.identity_id);
            current.warning_count = commit.expected_warning_count + n + 1;
            Ok(CommitResult::Conflict { current })
        }
        async fn upsert_ban(
            &self,
            id: &IdentityId,
            reason: &str,
            at: DateTime<Utc>,
            ban_threshold: u32,
        ) -> LedgerResult<SanctionState> {
            self.inner.upsert_ban(id, reason, at, ban_threshold).await
        }
        async fn enqueue_ban_event(&self, event: BanEvent) -> LedgerResult<bool> {
            self.inner.enqueue_ban_event(event).await
        }
        async fn pending_ban_events(&self) -> LedgerResult<Vec<OutboxEntry>> {
            self.inner.pending_ban_events().await
        }
        async fn record_delivery_attempt(&self, key: &str) -> LedgerResult<()> {
            self.inner.record_delivery_attempt(key).await
        }
        async fn mark_ban_event_delivered(&self, key: &str) -> LedgerResult<()> {
            self.inner.mark_ban_event_delivered(key).await
        }
        async fn violations(&self, id: &IdentityId) -> LedgerResult<Vec<ViolationRecord>> {
            self.inner.violations(id).await
        }
    }

    #[tokio::test]
    async fn test_ladder_to_ban() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = EscalationEngine::new(ledger.clone());
        let id = IdentityId::from("user-1");

        let mut tiers = Vec::new();
        for _ in 0..4 {
            let decision = engine
                .record_violation(&id, "bad post", &verdict("insult"))
                .await
                .unwrap();
            tiers.push(decision.tier());
        }

        assert_eq!(
            tiers,
            vec![
                SanctionTier::Warn1,
                SanctionTier::Warn2,
                SanctionTier::WarnFinal,
                SanctionTier::Banned
            ]
        );
        let state = ledger.sanction_state(&id).await.unwrap().unwrap();
        assert!(state.is_banned);
        assert_eq!(state.warning_count, 4);
        assert_eq!(state.ban_reason.as_deref(), Some("insult"));
        assert_eq!(ledger.pending_ban_events().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_banned_identity_gets_no_strike() {
        let ledger = Arc::new(InMemoryLedger::new());
        let id = IdentityId::from("user-1");
        let mut state = SanctionState::clean(id.clone());
        state.warning_count = 4;
        ledger.put_sanction_state(state).unwrap();
        ledger.upsert_ban(&id, "earlier ban", Utc::now(), 4).await.unwrap();
        let engine = EscalationEngine::new(ledger.clone());

        let decision = engine
            .record_violation(&id, "bad post", &verdict("insult"))
            .await
            .unwrap();

        assert_eq!(
            decision,
            EscalationDecision::AlreadyBanned {
                reason: Some("earlier ban".to_string())
            }
        );
        assert!(ledger.violations(&id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inconsistent_count_bans_immediately() {
        let ledger = Arc::new(InMemoryLedger::new());
        let id = IdentityId::from("user-1");
        let mut state = SanctionState::clean(id.clone());
        state.warning_count = 7;
        ledger.put_sanction_state(state).unwrap();
        let engine = EscalationEngine::new(ledger.clone());

        let decision = engine
            .record_violation(&id, "bad post", &verdict("insult"))
            .await
            .unwrap();

        assert!(matches!(
            decision,
            EscalationDecision::Banned { warning_number: 8, .. }
        ));
        assert!(ledger.sanction_state(&id).await.unwrap().unwrap().is_banned);
    }

    #[tokio::test]
    async fn test_retries_exhausted_fails_loudly() {
        let ledger = Arc::new(AlwaysConflicting {
            inner: InMemoryLedger::new(),
            commits: AtomicU32::new(0),
        });
        let bus = EventBus::new().shared();
        let mut rx = bus.subscribe();
        let config = EscalationConfig {
            max_commit_attempts: 3,
            ..EscalationConfig::default()
        };
        let engine = EscalationEngine::with_config(ledger.clone(), config, MessageTemplates::default())
            .with_events(bus);
        let id = IdentityId::from("user-1");

        let err = engine
            .record_violation(&id, "bad post", &verdict("insult"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            EnforcementError::ConflictRetriesExhausted { attempts: 3, .. }
        ));
        assert_eq!(ledger.commits.load(Ordering::SeqCst), 3);

        let mut conflicts = 0;
        while let Ok(event) = rx.try_recv() {
            if event.event_type() == "commit_conflict" {
                conflicts += 1;
            }
        }
        assert_eq!(conflicts, 3);
    }

    #[tokio::test]
    async fn test_messages_carry_reason() {
        let ledger = Arc::new(InMemoryLedger::new());
        let engine = EscalationEngine::new(ledger);
        let id = IdentityId::from("user-1");

        let decision = engine
            .record_violation(&id, "bad post", &verdict("name calling"))
            .await
            .unwrap();

        match decision {
            EscalationDecision::Warned { message, warning_number, .. } => {
                assert_eq!(warning_number, 1);
                assert!(message.contains("name calling"));
            }
            other => panic!("expected warning, got {other:?}"),
        }
    }
}
