//! Ledger record types

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::Severity;
use crate::error::{LedgerError, LedgerResult};

/// Opaque reference to a user owned by the external identity system.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IdentityId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for IdentityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Sanction fields of one identity.
///
/// `is_banned` implies `banned_at` is set and `warning_count` has reached the
/// ban threshold. `warning_count` never decreases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SanctionState {
    pub identity_id: IdentityId,
    pub warning_count: u32,
    pub is_banned: bool,
    pub ban_reason: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SanctionState {
    /// The implicit state of an identity with no record yet.
    pub fn clean(identity_id: IdentityId) -> Self {
        Self {
            identity_id,
            warning_count: 0,
            is_banned: false,
            ban_reason: None,
            banned_at: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether a commit expecting `expected` strikes may be applied.
    pub fn accepts(&self, expected: u32) -> bool {
        !self.is_banned && self.warning_count == expected
    }

    /// State after applying `commit`. Caller must have checked [`Self::accepts`].
    pub fn apply(&self, commit: &ViolationCommit) -> Self {
        let mut next = self.clone();
        next.warning_count = commit.record.warning_number;
        next.updated_at = commit.record.created_at;
        if let Some(ban) = &commit.ban {
            next.is_banned = true;
            next.ban_reason = Some(ban.reason.clone());
            next.banned_at = Some(ban.banned_at);
        }
        next
    }

    /// Idempotent ban upsert. Returns `Ok(None)` when already banned.
    ///
    /// An unbanned identity below `ban_threshold` strikes is refused, so a
    /// ban can never be stored without the strikes that earned it.
    pub fn banned(
        &self,
        reason: &str,
        banned_at: DateTime<Utc>,
        ban_threshold: u32,
    ) -> LedgerResult<Option<Self>> {
        if self.is_banned {
            return Ok(None);
        }
        if self.warning_count < ban_threshold {
            return Err(LedgerError::BanBelowThreshold {
                identity_id: self.identity_id.to_string(),
                warning_count: self.warning_count,
                ban_threshold,
            });
        }
        let mut next = self.clone();
        next.is_banned = true;
        next.ban_reason = Some(reason.to_string());
        next.banned_at = Some(banned_at);
        next.updated_at = Utc::now();
        Ok(Some(next))
    }
}

/// One confirmed violation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: Uuid,
    pub identity_id: IdentityId,
    pub content_snapshot: String,
    pub reason: String,
    pub severity: Severity,
    /// `warning_count` after the increment that created this record.
    pub warning_number: u32,
    pub created_at: DateTime<Utc>,
}

impl ViolationRecord {
    pub fn new(
        identity_id: IdentityId,
        content_snapshot: impl Into<String>,
        reason: impl Into<String>,
        severity: Severity,
        warning_number: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_id,
            content_snapshot: content_snapshot.into(),
            reason: reason.into(),
            severity,
            warning_number,
            created_at: Utc::now(),
        }
    }
}

/// A conditional write: record + state update, applied only if the stored
/// `warning_count` still equals `expected_warning_count` and the identity is
/// not banned.
///
/// When `ban` is set, the ban fields and the outbox entry for the event are
/// part of the same atomic write.
#[derive(Debug, Clone)]
pub struct ViolationCommit {
    pub identity_id: IdentityId,
    pub expected_warning_count: u32,
    pub record: ViolationRecord,
    pub ban: Option<BanEvent>,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitResult {
    /// Record and state were written atomically.
    Committed(SanctionState),
    /// Someone else moved the state first. Nothing was written.
    Conflict { current: SanctionState },
}

/// Outbound "ban occurred" event for refund and notification consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanEvent {
    pub identity_id: IdentityId,
    pub reason: String,
    pub banned_at: DateTime<Utc>,
    pub idempotency_key: String,
}

impl BanEvent {
    pub fn new(identity_id: IdentityId, reason: impl Into<String>, banned_at: DateTime<Utc>) -> Self {
        let idempotency_key = idempotency_key(&identity_id, banned_at);
        Self {
            identity_id,
            reason: reason.into(),
            banned_at,
            idempotency_key,
        }
    }
}

/// Deterministic key for one ban: the same identity and ban instant always
/// produce the same key.
pub fn idempotency_key(identity_id: &IdentityId, banned_at: DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(identity_id.as_str().as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(
        banned_at
            .to_rfc3339_opts(SecondsFormat::Nanos, true)
            .as_bytes(),
    );
    hasher.finalize().to_hex().to_string()
}

/// Outbox row wrapping a [`BanEvent`] with delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub event: BanEvent,
    pub enqueued_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_attempts: u32,
}

impl OutboxEntry {
    pub fn new(event: BanEvent) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
            delivered_at: None,
            delivery_attempts: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.delivered_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn commit(expected: u32, ban: bool) -> ViolationCommit {
        let id = IdentityId::from("user-1");
        ViolationCommit {
            identity_id: id.clone(),
            expected_warning_count: expected,
            ban: ban.then(|| BanEvent::new(id.clone(), "insult", Utc::now())),
            record: ViolationRecord::new(id, "text", "insult", Severity::Medium, expected + 1),
        }
    }

    #[test]
    fn clean_state_accepts_zero() {
        let state = SanctionState::clean("user-1".into());
        assert!(state.accepts(0));
        assert!(!state.accepts(1));
    }

    #[test]
    fn banned_state_accepts_nothing() {
        let mut state = SanctionState::clean("user-1".into());
        state.warning_count = 4;
        let state = state.banned("spam", Utc::now(), 4).unwrap().unwrap();
        assert!(!state.accepts(0));
        assert!(!state.accepts(4));
    }

    #[test]
    fn apply_sets_count_from_record() {
        let state = SanctionState::clean("user-1".into());
        let next = state.apply(&commit(0, false));
        assert_eq!(next.warning_count, 1);
        assert!(!next.is_banned);
    }

    #[test]
    fn apply_with_ban_sets_all_ban_fields() {
        let mut state = SanctionState::clean("user-1".into());
        state.warning_count = 3;
        let next = state.apply(&commit(3, true));
        assert_eq!(next.warning_count, 4);
        assert!(next.is_banned);
        assert_eq!(next.ban_reason.as_deref(), Some("insult"));
        assert!(next.banned_at.is_some());
    }

    #[test]
    fn ban_upsert_is_idempotent() {
        let mut state = SanctionState::clean("user-1".into());
        state.warning_count = 4;
        let banned = state.banned("spam", Utc::now(), 4).unwrap().unwrap();
        assert!(banned.banned("spam again", Utc::now(), 4).unwrap().is_none());
    }

    #[test]
    fn ban_below_threshold_is_refused() {
        let mut state = SanctionState::clean("user-1".into());
        state.warning_count = 3;
        let err = state.banned("spam", Utc::now(), 4).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::BanBelowThreshold {
                warning_count: 3,
                ban_threshold: 4,
                ..
            }
        ));
    }

    #[test]
    fn idempotency_key_is_stable_per_identity_and_instant() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let a = idempotency_key(&"user-1".into(), at);
        let b = idempotency_key(&"user-1".into(), at);
        let c = idempotency_key(&"user-2".into(), at);
        let d = idempotency_key(&"user-1".into(), at + chrono::Duration::nanoseconds(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn ban_event_wire_format() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let event = BanEvent::new("user-1".into(), "hate speech", at);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["identityId"], "user-1");
        assert_eq!(json["reason"], "hate speech");
        assert_eq!(json["idempotencyKey"], event.idempotency_key.as_str());
        assert!(json["bannedAt"].is_string());
    }
}
