//! Event types for moderation observability
//!
//! Every event carries enough context to be audited on its own.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::{FailOpenCause, Severity};
use crate::ledger::IdentityId;

/// All moderation events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModerationEvent {
    /// The gate turned a banned identity away before classification
    SubmissionRejected {
        identity_id: IdentityId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// No valid classification was obtained; content was allowed
    ClassifierFailOpen {
        identity_id: IdentityId,
        cause: FailOpenCause,
        timestamp: DateTime<Utc>,
    },

    /// A violation was reported below the confidence threshold; content was allowed
    LowConfidenceViolation {
        identity_id: IdentityId,
        severity: Severity,
        confidence: f64,
        threshold: f64,
        timestamp: DateTime<Utc>,
    },

    /// A strike was committed to the ledger
    ViolationRecorded {
        identity_id: IdentityId,
        record_id: Uuid,
        warning_number: u32,
        severity: Severity,
        timestamp: DateTime<Utc>,
    },

    /// An optimistic commit lost a race and will be retried
    CommitConflict {
        identity_id: IdentityId,
        attempt: u32,
        observed_warning_count: u32,
        timestamp: DateTime<Utc>,
    },

    /// Ban persisted and its outbound event queued
    BanEnforced {
        identity_id: IdentityId,
        idempotency_key: String,
        timestamp: DateTime<Utc>,
    },

    /// A queued ban event reached the downstream sink
    BanEventDelivered {
        identity_id: IdentityId,
        idempotency_key: String,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
}

impl ModerationEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::SubmissionRejected { .. } => "submission_rejected",
            Self::ClassifierFailOpen { .. } => "classifier_fail_open",
            Self::LowConfidenceViolation { .. } => "low_confidence_violation",
            Self::ViolationRecorded { .. } => "violation_recorded",
            Self::CommitConflict { .. } => "commit_conflict",
            Self::BanEnforced { .. } => "ban_enforced",
            Self::BanEventDelivered { .. } => "ban_event_delivered",
        }
    }

    /// Get the event timestamp
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::SubmissionRejected { timestamp, .. }
            | Self::ClassifierFailOpen { timestamp, .. }
            | Self::LowConfidenceViolation { timestamp, .. }
            | Self::ViolationRecorded { timestamp, .. }
            | Self::CommitConflict { timestamp, .. }
            | Self::BanEnforced { timestamp, .. }
            | Self::BanEventDelivered { timestamp, .. } => *timestamp,
        }
    }

    /// Identity the event concerns
    pub fn identity_id(&self) -> &IdentityId {
        match self {
            Self::SubmissionRejected { identity_id, .. }
            | Self::ClassifierFailOpen { identity_id, .. }
            | Self::LowConfidenceViolation { identity_id, .. }
            | Self::ViolationRecorded { identity_id, .. }
            | Self::CommitConflict { identity_id, .. }
            | Self::BanEnforced { identity_id, .. }
            | Self::BanEventDelivered { identity_id, .. } => identity_id,
        }
    }

    /// Whether this event marks a degraded or suspicious path worth alerting on
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::ClassifierFailOpen { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ModerationEvent::ClassifierFailOpen {
            identity_id: "user-1".into(),
            cause: FailOpenCause::no_providers(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "classifier_fail_open");
        assert_eq!(json["identity_id"], "user-1");
        assert_eq!(json["cause"]["kind"], "no_providers");
        assert!(event.is_anomaly());
    }

    #[test]
    fn test_event_type_matches_tag() {
        let event = ModerationEvent::BanEnforced {
            identity_id: "user-1".into(),
            idempotency_key: "abc".into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_type());
        assert!(!event.is_anomaly());
    }
}
