//! Identity Gate: the fast-path ban check.
//!
//! Runs before classification so banned identities never cost a classifier
//! call. The engine re-checks the ban flag inside every commit attempt, so
//! a ban landing between this check and a write is still honored.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LedgerResult;
use crate::escalation::DEFAULT_BANNED_NOTICE;
use crate::ledger::{IdentityId, SharedLedger};

/// Answer of [`IdentityGate::can_submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GateDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

pub struct IdentityGate {
    ledger: SharedLedger,
    banned_notice: String,
}

impl IdentityGate {
    pub fn new(ledger: SharedLedger) -> Self {
        Self {
            ledger,
            banned_notice: DEFAULT_BANNED_NOTICE.to_string(),
        }
    }

    /// Text returned when a banned identity has no stored reason.
    pub fn with_banned_notice(mut self, notice: impl Into<String>) -> Self {
        self.banned_notice = notice.into();
        self
    }

    /// Whether `identity_id` may submit content at all.
    ///
    /// No stored state means a clean identity.
    pub async fn can_submit(&self, identity_id: &IdentityId) -> LedgerResult<GateDecision> {
        let Some(state) = self.ledger.sanction_state(identity_id).await? else {
            return Ok(GateDecision::allow());
        };

        if state.is_banned {
            debug!(%identity_id, "Gate rejected banned identity");
            let reason = state
                .ban_reason
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| self.banned_notice.clone());
            return Ok(GateDecision::deny(reason));
        }

        Ok(GateDecision::allow())
    }
}
