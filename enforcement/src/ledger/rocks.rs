//! RocksDB-backed durable ledger
//!
//! Column families separate sanction state, violation records and the ban
//! outbox. Values are bincode-encoded.
//!
//! The conditional write reads the sanction row, compares, and then writes
//! the violation row and the new sanction row in one `WriteBatch`. A commit
//! mutex covers only that read-compare-write, so it never spans a classifier
//! call and one identity's transition blocks others for a single batch write
//! at most.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::schema::{self, ALL_CFS};
use super::types::*;
use super::ViolationLedger;
use crate::error::{LedgerError, LedgerResult};

/// Shared reference to RocksLedger
pub type SharedRocksLedger = Arc<RocksLedger>;

/// Durable [`ViolationLedger`] on RocksDB.
pub struct RocksLedger {
    db: DB,
    path: PathBuf,
    commit_lock: Mutex<()>,
}

fn encode<T: Serialize>(value: &T) -> LedgerResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| LedgerError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> LedgerResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| LedgerError::Deserialization(e.to_string()))
}

impl RocksLedger {
    /// Open or create a ledger at the given path
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)?;
        debug!(path = %path.display(), "Ledger opened");

        Ok(Self {
            db,
            path,
            commit_lock: Mutex::new(()),
        })
    }

    /// Create a shared reference to this ledger
    pub fn shared(self) -> SharedRocksLedger {
        Arc::new(self)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn cf(&self, name: &str) -> LedgerResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LedgerError::ColumnFamilyNotFound(name.to_string()))
    }

    fn get<T: DeserializeOwned>(&self, cf_name: &str, key: &str) -> LedgerResult<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_cf(cf, key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put<T: Serialize>(&self, cf_name: &str, key: &str, value: &T) -> LedgerResult<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Overwrite the stored state for an identity. For imports and repair;
    /// bypasses the strike rules.
    pub fn put_sanction_state(&self, state: &SanctionState) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let key = schema::keys::sanction(state.identity_id.as_str());
        self.put(schema::CF_SANCTIONS, &key, state)
    }

    fn load_state(&self, identity_id: &IdentityId) -> LedgerResult<Option<SanctionState>> {
        let key = schema::keys::sanction(identity_id.as_str());
        self.get(schema::CF_SANCTIONS, &key)
    }

    fn load_outbox(&self, idempotency_key: &str) -> LedgerResult<Option<OutboxEntry>> {
        self.get(schema::CF_OUTBOX, &schema::keys::outbox(idempotency_key))
    }
}

#[async_trait]
impl ViolationLedger for RocksLedger {
    async fn sanction_state(&self, identity_id: &IdentityId) -> LedgerResult<Option<SanctionState>> {
        self.load_state(identity_id)
    }

    async fn commit_violation(&self, commit: ViolationCommit) -> LedgerResult<CommitResult> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;

        let current = self
            .load_state(&commit.identity_id)?
            .unwrap_or_else(|| SanctionState::clean(commit.identity_id.clone()));

        if !current.accepts(commit.expected_warning_count) {
            return Ok(CommitResult::Conflict { current });
        }

        let next = current.apply(&commit);
        let id = commit.identity_id.as_str();

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(schema::CF_VIOLATIONS)?,
            schema::keys::violation(id, commit.record.warning_number).as_bytes(),
            encode(&commit.record)?,
        );
        batch.put_cf(
            self.cf(schema::CF_SANCTIONS)?,
            schema::keys::sanction(id).as_bytes(),
            encode(&next)?,
        );
        if let Some(event) = &commit.ban {
            if self.load_outbox(&event.idempotency_key)?.is_none() {
                batch.put_cf(
                    self.cf(schema::CF_OUTBOX)?,
                    schema::keys::outbox(&event.idempotency_key).as_bytes(),
                    encode(&OutboxEntry::new(event.clone()))?,
                );
            }
        }
        self.db.write(batch)?;

        Ok(CommitResult::Committed(next))
    }

    async fn upsert_ban(
        &self,
        identity_id: &IdentityId,
        reason: &str,
        banned_at: DateTime<Utc>,
        ban_threshold: u32,
    ) -> LedgerResult<SanctionState> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        let current = self
            .load_state(identity_id)?
            .unwrap_or_else(|| SanctionState::clean(identity_id.clone()));

        match current.banned(reason, banned_at, ban_threshold)? {
            Some(next) => {
                self.put(
                    schema::CF_SANCTIONS,
                    &schema::keys::sanction(identity_id.as_str()),
                    &next,
                )?;
                Ok(next)
            }
            None => Ok(current),
        }
    }

    async fn enqueue_ban_event(&self, event: BanEvent) -> LedgerResult<bool> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if self.load_outbox(&event.idempotency_key)?.is_some() {
            return Ok(false);
        }
        let key = schema::keys::outbox(&event.idempotency_key);
        self.put(schema::CF_OUTBOX, &key, &OutboxEntry::new(event))?;
        Ok(true)
    }

    async fn pending_ban_events(&self) -> LedgerResult<Vec<OutboxEntry>> {
        let cf = self.cf(schema::CF_OUTBOX)?;
        let mut pending = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            let entry: OutboxEntry = decode(&value)?;
            if entry.is_pending() {
                pending.push(entry);
            }
        }
        pending.sort_by(|a, b| a.event.banned_at.cmp(&b.event.banned_at));
        Ok(pending)
    }

    async fn record_delivery_attempt(&self, idempotency_key: &str) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(mut entry) = self.load_outbox(idempotency_key)? {
            entry.delivery_attempts += 1;
            self.put(schema::CF_OUTBOX, &schema::keys::outbox(idempotency_key), &entry)?;
        }
        Ok(())
    }

    async fn mark_ban_event_delivered(&self, idempotency_key: &str) -> LedgerResult<()> {
        let _guard = self.commit_lock.lock().map_err(|_| LedgerError::LockPoisoned)?;
        if let Some(mut entry) = self.load_outbox(idempotency_key)? {
            if entry.delivered_at.is_none() {
                entry.delivered_at = Some(Utc::now());
                self.put(schema::CF_OUTBOX, &schema::keys::outbox(idempotency_key), &entry)?;
            }
        }
        Ok(())
    }

    async fn violations(&self, identity_id: &IdentityId) -> LedgerResult<Vec<ViolationRecord>> {
        let cf = self.cf(schema::CF_VIOLATIONS)?;
        let prefix = schema::keys::violation_prefix(identity_id.as_str());

        let mut records = Vec::new();
        for item in self.db.prefix_iterator_cf(cf, prefix.as_bytes()) {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break; // Prefix no longer matches
            }
            let record = decode::<ViolationRecord>(&value)?;
            if schema::keys::parse_warning_number(&key) != Some(record.warning_number) {
                return Err(LedgerError::Deserialization(format!(
                    "violation key does not match record {} of {}",
                    record.warning_number, identity_id
                )));
            }
            records.push(record);
        }
        // Zero-padded keys already iterate in strike order.
        Ok(records)
    }
}
