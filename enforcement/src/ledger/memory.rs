//! Process-local ledger.
//!
//! Same conditional-write semantics as the RocksDB ledger, without
//! durability. The mutex is held only for the compare-and-write itself.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::types::*;
use super::ViolationLedger;
use crate::error::{LedgerError, LedgerResult};

#[derive(Default)]
struct Inner {
    states: HashMap<IdentityId, SanctionState>,
    violations: HashMap<IdentityId, Vec<ViolationRecord>>,
    outbox: BTreeMap<String, OutboxEntry>,
}

/// In-memory [`ViolationLedger`].
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the stored state for an identity. For seeding fixtures and
    /// imports; bypasses the strike rules.
    pub fn put_sanction_state(&self, state: SanctionState) -> LedgerResult<()> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        inner.states.insert(state.identity_id.clone(), state);
        Ok(())
    }

    /// Number of outbox entries, delivered or not.
    pub fn outbox_len(&self) -> LedgerResult<usize> {
        let inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(inner.outbox.len())
    }
}

#[async_trait]
impl ViolationLedger for InMemoryLedger {
    async fn sanction_state(&self, identity_id: &IdentityId) -> LedgerResult<Option<SanctionState>> {
        let inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        Ok(inner.states.get(identity_id).cloned())
    }

    async fn commit_violation(&self, commit: ViolationCommit) -> LedgerResult<CommitResult> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;

        let current = inner
            .states
            .get(&commit.identity_id)
            .cloned()
            .unwrap_or_else(|| SanctionState::clean(commit.identity_id.clone()));

        if !current.accepts(commit.expected_warning_count) {
            return Ok(CommitResult::Conflict { current });
        }

        let next = current.apply(&commit);
        if let Some(event) = commit.ban {
            inner
                .outbox
                .entry(event.idempotency_key.clone())
                .or_insert_with(|| OutboxEntry::new(event));
        }
        inner
            .violations
            .entry(commit.identity_id.clone())
            .or_default()
            .push(commit.record);
        inner.states.insert(commit.identity_id, next.clone());
        Ok(CommitResult::Committed(next))
    }

    async fn upsert_ban(
        &self,
        identity_id: &IdentityId,
        reason: &str,
        banned_at: DateTime<Utc>,
        ban_threshold: u32,
    ) -> LedgerResult<SanctionState> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let current = inner
            .states
            .get(identity_id)
            .cloned()
            .unwrap_or_else(|| SanctionState::clean(identity_id.clone()));

        match current.banned(reason, banned_at, ban_threshold)? {
            Some(next) => {
                inner.states.insert(identity_id.clone(), next.clone());
                Ok(next)
            }
            None => Ok(current),
        }
    }

    async fn enqueue_ban_event(&self, event: BanEvent) -> LedgerResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if inner.outbox.contains_key(&event.idempotency_key) {
            return Ok(false);
        }
        inner
            .outbox
            .insert(event.idempotency_key.clone(), OutboxEntry::new(event));
        Ok(true)
    }

    async fn pending_ban_events(&self) -> LedgerResult<Vec<OutboxEntry>> {
        let inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut pending: Vec<OutboxEntry> = inner
            .outbox
            .values()
            .filter(|e| e.is_pending())
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.event.banned_at.cmp(&b.event.banned_at));
        Ok(pending)
    }

    async fn record_delivery_attempt(&self, idempotency_key: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(entry) = inner.outbox.get_mut(idempotency_key) {
            entry.delivery_attempts += 1;
        }
        Ok(())
    }

    async fn mark_ban_event_delivered(&self, idempotency_key: &str) -> LedgerResult<()> {
        let mut inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(entry) = inner.outbox.get_mut(idempotency_key) {
            if entry.delivered_at.is_none() {
                entry.delivered_at = Some(Utc::now());
            }
        }
        Ok(())
    }

    async fn violations(&self, identity_id: &IdentityId) -> LedgerResult<Vec<ViolationRecord>> {
        let inner = self.inner.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let mut records = inner
            .violations
            .get(identity_id)
            .cloned()
            .unwrap_or_default();
        records.sort_by_key(|r| r.warning_number);
        Ok(records)
    }
}
