//! Concurrent final-strike tests.
//!
//! Tests verify:
//! - Two racing violations at warning_count=3 produce exactly one ban
//! - The loser re-reads and observes the ban instead of writing
//! - N ≥ 4 concurrent violations from zero end at exactly 4 strikes and one ban event
//! - Unrelated identities progress independently under load

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use enforcement::{
    BanEvent, ClassificationResult, ClassifierProvider, CommitResult, EngineConfig, EventBus,
    IdentityId, InMemoryLedger, LedgerResult, ModerationEvent, ModerationOutcome,
    ModerationService, OutboxEntry, OutcomeTier, PolicyClassifier, ProviderError, RetryPolicy,
    SanctionState, Severity, ViolationCommit, ViolationLedger, ViolationRecord,
};
use tokio::sync::Barrier;

struct AlwaysViolating;

#[async_trait]
impl ClassifierProvider for AlwaysViolating {
    async fn classify(&self, _content: &str) -> Result<ClassificationResult, ProviderError> {
        Ok(ClassificationResult {
            is_violation: true,
            severity: Severity::Medium,
            reason: "harassment".to_string(),
            confidence: 0.9,
        })
    }
}

/// Holds the first `gated` commits at a barrier so that every participant
/// has already read its expected `warning_count` before any of them writes.
struct RacingLedger {
    inner: InMemoryLedger,
    barrier: Barrier,
    gated: usize,
    commits: AtomicUsize,
}

impl RacingLedger {
    fn new(inner: InMemoryLedger, gated: usize) -> Self {
        Self {
            inner,
            barrier: Barrier::new(gated),
            gated,
            commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ViolationLedger for RacingLedger {
    async fn sanction_state(&self, id: &IdentityId) -> LedgerResult<Option<SanctionState>> {
        self.inner.sanction_state(id).await
    }
    async fn commit_violation(&self, commit: ViolationCommit) -> LedgerResult<CommitResult> {
        if self.commits.fetch_add(1, Ordering::SeqCst) < self.gated {
            self.barrier.wait().await;
        }
        self.inner.commit_violation(commit).await
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

fn service(ledger: Arc<dyn ViolationLedger>, bus: Arc<EventBus>) -> Arc<ModerationService> {
    let mut config = EngineConfig::default();
    config.classifier.retry = RetryPolicy::none();
    let classifier = PolicyClassifier::new(config.classifier.clone()).with_provider(
        "always",
        Arc::new(AlwaysViolating),
    );
    ModerationService::new(ledger, classifier, &config)
        .with_events(bus)
        .shared()
}

fn count_events(rx: &mut tokio::sync::broadcast::Receiver<ModerationEvent>, kind: &str) -> usize {
    let mut n = 0;
    while let Ok(event) = rx.try_recv() {
        if event.event_type() == kind {
            n += 1;
        }
    }
    n
}

async fn submit_all(
    service: &Arc<ModerationService>,
    id: &IdentityId,
    n: usize,
) -> Vec<ModerationOutcome> {
    let handles: Vec<_> = (0..n)
        .map(|i| {
            let service = Arc::clone(service);
            let id = id.clone();
            tokio::spawn(async move {
                service
                    .submit_for_moderation(&format!("post {i}"), &id)
                    .await
            })
        })
        .collect();

    futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_d_two_racing_final_strikes_ban_once() {
    let inner = InMemoryLedger::new();
    let id = IdentityId::from("user-d");
    let mut state = SanctionState::clean(id.clone());
    state.warning_count = 3;
    inner.put_sanction_state(state).unwrap();

    let ledger = Arc::new(RacingLedger::new(inner, 2));
    let bus = EventBus::new().shared();
    let mut rx = bus.subscribe();
    let service = service(ledger.clone(), bus);

    let outcomes = submit_all(&service, &id, 2).await;

    // Both are rejected as banned: one by banning, one by observing the ban.
    assert!(outcomes
        .iter()
        .all(|o| !o.allowed && o.tier == Some(OutcomeTier::Banned)));

    let state = ledger.sanction_state(&id).await.unwrap().unwrap();
    assert!(state.is_banned);
    assert_eq!(state.warning_count, 4);

    let records = ledger.violations(&id).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].warning_number, 4);

    assert_eq!(ledger.pending_ban_events().await.unwrap().len(), 1);
    // Two gated commits plus nothing else: the loser's retry saw the ban
    // before writing.
    assert_eq!(ledger.commits.load(Ordering::SeqCst), 2);
    assert_eq!(count_events(&mut rx, "ban_enforced"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_concurrent_violations_yield_one_ban() {
    let ledger = Arc::new(InMemoryLedger::new());
    let bus = EventBus::new().shared();
    let mut rx = bus.subscribe();
    let service = service(ledger.clone(), bus);
    let id = IdentityId::from("user-burst");

    let outcomes = submit_all(&service, &id, 12).await;

    assert!(outcomes.iter().all(|o| !o.allowed));
    let mut warned: Vec<u8> = outcomes
        .iter()
        .filter_map(|o| match o.tier {
            Some(OutcomeTier::Warning(n)) => Some(n),
            _ => None,
        })
        .collect();
    warned.sort_unstable();
    assert_eq!(warned, vec![1, 2, 3]);

    let state = ledger.sanction_state(&id).await.unwrap().unwrap();
    assert!(state.is_banned);
    assert_eq!(state.warning_count, 4);

    let numbers: Vec<u32> = ledger
        .violations(&id)
        .await
        .unwrap()
        .iter()
        .map(|r| r.warning_number)
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);

    assert_eq!(ledger.outbox_len().unwrap(), 1);
    assert_eq!(count_events(&mut rx, "ban_enforced"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unrelated_identities_progress_independently() {
    let ledger = Arc::new(InMemoryLedger::new());
    let service = service(ledger.clone(), EventBus::new().shared());

    let ids: Vec<IdentityId> = (0..6).map(|i| IdentityId::new(format!("user-{i}"))).collect();
    let mut handles = Vec::new();
    for id in &ids {
        for round in 0..2 {
            let service = Arc::clone(&service);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .submit_for_moderation(&format!("round {round}"), &id)
                    .await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for id in &ids {
        let state = ledger.sanction_state(id).await.unwrap().unwrap();
        assert_eq!(state.warning_count, 2);
        assert!(!state.is_banned);
    }
    assert_eq!(ledger.outbox_len().unwrap(), 0);
}
