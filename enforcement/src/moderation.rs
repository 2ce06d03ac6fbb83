//! `submit_for_moderation`: the one entry point callers use.
//!
//! ```text
//! content + identity
//!   → input check      (empty / oversized → InvalidContent)
//!   → IdentityGate     (banned → rejected, classifier never called)
//!   → PolicyClassifier (unclassified → allowed, anomaly event)
//!   → policy           (no violation, low confidence or exempt severity → allowed)
//!   → EscalationEngine (warned / banned / already banned)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationOutcome, PolicyClassifier};
use crate::config::{EngineConfig, ModerationPolicy};
use crate::error::{EnforcementError, EnforcementResult};
use crate::escalation::{EscalationDecision, EscalationEngine, OutcomeTier};
use crate::events::{ModerationEvent, SharedEventBus};
use crate::gate::IdentityGate;
use crate::ledger::{IdentityId, SharedLedger};

/// What the caller sees for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<OutcomeTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ModerationOutcome {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            tier: None,
            message: None,
        }
    }

    fn rejected(tier: Option<OutcomeTier>, message: String) -> Self {
        Self {
            allowed: false,
            tier,
            message: Some(message),
        }
    }
}

/// Wires gate, classifier and engine over one shared ledger.
pub struct ModerationService {
    gate: IdentityGate,
    classifier: PolicyClassifier,
    engine: EscalationEngine,
    default_policy: ModerationPolicy,
    policies: BTreeMap<String, ModerationPolicy>,
    events: Option<SharedEventBus>,
}

impl ModerationService {
    pub fn new(ledger: SharedLedger, classifier: PolicyClassifier, config: &EngineConfig) -> Self {
        let gate =
            IdentityGate::new(ledger.clone()).with_banned_notice(config.messages.gate_rejected.clone());
        let engine = EscalationEngine::with_config(
            ledger,
            config.escalation.clone(),
            config.messages.clone(),
        );
        Self {
            gate,
            default_policy: ModerationPolicy::with_confidence_threshold(
                classifier.config().confidence_threshold,
            ),
            policies: config.policies.clone(),
            classifier,
            engine,
            events: None,
        }
    }

    pub fn with_events(mut self, events: SharedEventBus) -> Self {
        self.engine = self.engine.with_events(events.clone());
        self.events = Some(events);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn gate(&self) -> &IdentityGate {
        &self.gate
    }

    /// Policy applied to `channel`, falling back to the default policy.
    pub fn policy(&self, channel: &str) -> &ModerationPolicy {
        self.policies.get(channel).unwrap_or(&self.default_policy)
    }

    /// Moderate one submission under the default policy.
    ///
    /// Errors mean the outcome could not be recorded durably; the caller must
    /// not treat the content as accepted.
    pub async fn submit_for_moderation(
        &self,
        content: &str,
        identity_id: &IdentityId,
    ) -> EnforcementResult<ModerationOutcome> {
        self.submit_with_policy(content, identity_id, &self.default_policy)
            .await
    }

    /// Moderate one submission under the named channel's policy.
    pub async fn submit_in_channel(
        &self,
        channel: &str,
        content: &str,
        identity_id: &IdentityId,
    ) -> EnforcementResult<ModerationOutcome> {
        if !self.policies.contains_key(channel) {
            debug!(channel, "No policy for channel; using default");
        }
        self.submit_with_policy(content, identity_id, self.policy(channel))
            .await
    }

    /// Moderate one submission under an explicit policy. Strikes share one
    /// ladder regardless of the policy that confirmed them.
    pub async fn submit_with_policy(
        &self,
        content: &str,
        identity_id: &IdentityId,
        policy: &ModerationPolicy,
    ) -> EnforcementResult<ModerationOutcome> {
        // The audit snapshot is exactly the text the classifier judged.
        let text = self
            .classifier
            .prepare(content)
            .map_err(EnforcementError::InvalidContent)?;

        let gate = self.gate.can_submit(identity_id).await?;
        if !gate.allowed {
            let reason = gate.reason.unwrap_or_default();
            info!(%identity_id, "Submission rejected: identity is banned");
            self.publish(ModerationEvent::SubmissionRejected {
                identity_id: identity_id.clone(),
                reason: reason.clone(),
                timestamp: Utc::now(),
            });
            return Ok(ModerationOutcome::rejected(Some(OutcomeTier::Banned), reason));
        }

        let verdict = match self.classifier.classify(&text).await {
            ClassificationOutcome::Classified(verdict) => verdict,
            ClassificationOutcome::Unclassified(cause) => {
                warn!(
                    %identity_id,
                    kind = %cause.kind,
                    detail = %cause.detail,
                    "Classification unavailable; allowing content"
                );
                self.publish(ModerationEvent::ClassifierFailOpen {
                    identity_id: identity_id.clone(),
                    cause,
                    timestamp: Utc::now(),
                });
                return Ok(ModerationOutcome::allowed());
            }
        };

        if !verdict.is_violation {
            debug!(%identity_id, "Content clean");
            return Ok(ModerationOutcome::allowed());
        }

        if verdict.confidence <= policy.confidence_threshold {
            info!(
                %identity_id,
                confidence = verdict.confidence,
                threshold = policy.confidence_threshold,
                "Violation below confidence threshold; allowing content"
            );
            self.publish(ModerationEvent::LowConfidenceViolation {
                identity_id: identity_id.clone(),
                severity: verdict.severity,
                confidence: verdict.confidence,
                threshold: policy.confidence_threshold,
                timestamp: Utc::now(),
            });
            return Ok(ModerationOutcome::allowed());
        }

        if !policy.blocks(verdict.severity) {
            info!(
                %identity_id,
                severity = %verdict.severity,
                "Violation severity not blocked by policy; allowing content"
            );
            return Ok(ModerationOutcome::allowed());
        }

        let decision = self
            .engine
            .record_violation(identity_id, &text, &verdict)
            .await?;

        Ok(match decision {
            EscalationDecision::Warned { tier, message, .. } => {
                ModerationOutcome::rejected(tier.outcome_tier(), message)
            }
            EscalationDecision::Banned { message, .. } => {
                ModerationOutcome::rejected(Some(OutcomeTier::Banned), message)
            }
            EscalationDecision::AlreadyBanned { reason } => {
                let message = reason.unwrap_or_else(|| self.engine.messages().gate_rejected.clone());
                ModerationOutcome::rejected(Some(OutcomeTier::Banned), message)
            }
        })
    }

    fn publish(&self, event: ModerationEvent) {
        if let Some(ref bus) = self.events {
            bus.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let allowed = serde_json::to_value(ModerationOutcome::allowed()).unwrap();
        assert_eq!(allowed, serde_json::json!({ "allowed": true }));

        let warned = ModerationOutcome::rejected(Some(OutcomeTier::Warning(2)), "careful".into());
        let json = serde_json::to_value(&warned).unwrap();
        assert_eq!(json["allowed"], false);
        assert_eq!(json["tier"], 2);
        assert_eq!(json["message"], "careful");
    }
}
