//! Violation Ledger
//!
//! Durable, append-only record of confirmed violations plus the current
//! sanction state of each identity, and the outbox of pending ban events.
//!
//! # Concurrency contract
//!
//! [`ViolationLedger::commit_violation`] is the only way strikes are added.
//! It is a compare-and-write keyed on the previously read `warning_count`:
//! the record and the state update land together or not at all. Callers
//! never hold anything across the classifier call; a lost race shows up as
//! [`CommitResult::Conflict`] and the caller re-reads.
//!
//! Implementations:
//! - [`InMemoryLedger`]: process-local, for tests and dry runs
//! - `RocksLedger` (feature `heavy-state`): RocksDB column families

pub mod memory;
#[cfg(feature = "heavy-state")]
pub mod rocks;
pub mod schema;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::LedgerResult;

pub use memory::InMemoryLedger;
#[cfg(feature = "heavy-state")]
pub use rocks::RocksLedger;
pub use types::{
    idempotency_key, BanEvent, CommitResult, IdentityId, OutboxEntry, SanctionState,
    ViolationCommit, ViolationRecord,
};

/// Shared reference to a ledger
pub type SharedLedger = Arc<dyn ViolationLedger>;

/// Storage contract for sanction state, violation records and the ban outbox.
#[async_trait]
pub trait ViolationLedger: Send + Sync {
    /// Stored sanction state, or `None` if the identity has never been sanctioned.
    async fn sanction_state(&self, identity_id: &IdentityId) -> LedgerResult<Option<SanctionState>>;

    /// Atomically append `commit.record` and advance the state, if and only if
    /// the stored state still matches `commit.expected_warning_count` and is
    /// not banned. A missing state counts as a clean one.
    async fn commit_violation(&self, commit: ViolationCommit) -> LedgerResult<CommitResult>;

    /// Mark the identity banned. A no-op returning the stored state if it is
    /// already banned. Fails with [`LedgerError::BanBelowThreshold`] when the
    /// identity is not banned and has fewer than `ban_threshold` strikes.
    ///
    /// [`LedgerError::BanBelowThreshold`]: crate::error::LedgerError::BanBelowThreshold
    async fn upsert_ban(
        &self,
        identity_id: &IdentityId,
        reason: &str,
        banned_at: DateTime<Utc>,
        ban_threshold: u32,
    ) -> LedgerResult<SanctionState>;

    /// Insert into the outbox unless an entry with the same idempotency key
    /// exists. Returns whether a new entry was created.
    async fn enqueue_ban_event(&self, event: BanEvent) -> LedgerResult<bool>;

    /// Undelivered outbox entries, oldest ban first.
    async fn pending_ban_events(&self) -> LedgerResult<Vec<OutboxEntry>>;

    /// Count one delivery attempt against an outbox entry.
    async fn record_delivery_attempt(&self, idempotency_key: &str) -> LedgerResult<()>;

    /// Mark an outbox entry delivered. Unknown keys are ignored.
    async fn mark_ban_event_delivered(&self, idempotency_key: &str) -> LedgerResult<()>;

    /// Every violation recorded for the identity, by `warning_number`.
    async fn violations(&self, identity_id: &IdentityId) -> LedgerResult<Vec<ViolationRecord>>;
}
