//! User-facing warning and suspension texts.
//!
//! Each template may contain a `{reason}` placeholder which is replaced by
//! the classifier's reason for the violation that produced the message.

use serde::{Deserialize, Serialize};

use super::tier::SanctionTier;

const REASON_PLACEHOLDER: &str = "{reason}";

/// Notice returned by the gate when a banned identity has no stored reason.
pub const DEFAULT_BANNED_NOTICE: &str =
    "Your account has been banned due to repeated violations of our community guidelines.";

/// Fixed message set, one per tier plus the gate rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub warn_1: String,
    pub warn_2: String,
    pub warn_final: String,
    pub ban: String,
    pub gate_rejected: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            warn_1: "First warning\n\nYour post was flagged as inappropriate:\n\"{reason}\"\n\n\
                     Please follow our community guidelines. Further violations will have \
                     stronger consequences."
                .to_string(),
            warn_2: "Second warning\n\nAnother violation was detected:\n\"{reason}\"\n\n\
                     This is your second warning. One more violation and there will be \
                     serious consequences."
                .to_string(),
            warn_final: "FINAL WARNING\n\nThird violation:\n\"{reason}\"\n\n\
                         IMPORTANT: your next violation will suspend your account and you \
                         will receive a refund of your payment minus a penalty fee."
                .to_string(),
            ban: "Account suspended\n\nYour account has been suspended for repeated violations \
                  of our community guidelines.\n\nLast violation: \"{reason}\"\n\n\
                  You will receive a refund of your payment minus a penalty fee within \
                  7 business days."
                .to_string(),
            gate_rejected: DEFAULT_BANNED_NOTICE.to_string(),
        }
    }
}

impl MessageTemplates {
    /// Template for a tier, `None` for `Clean`.
    pub fn template(&self, tier: SanctionTier) -> Option<&str> {
        match tier {
            SanctionTier::Clean => None,
            SanctionTier::Warn1 => Some(&self.warn_1),
            SanctionTier::Warn2 => Some(&self.warn_2),
            SanctionTier::WarnFinal => Some(&self.warn_final),
            SanctionTier::Banned => Some(&self.ban),
        }
    }

    pub fn render(&self, tier: SanctionTier, reason: &str) -> Option<String> {
        self.template(tier)
            .map(|t| t.replace(REASON_PLACEHOLDER, reason))
    }

    /// Templates must be non-empty and pairwise distinct.
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("warn_1", &self.warn_1),
            ("warn_2", &self.warn_2),
            ("warn_final", &self.warn_final),
            ("ban", &self.ban),
        ];
        for (name, text) in &all {
            if text.trim().is_empty() {
                return Err(format!("messages.{name} must not be empty"));
            }
        }
        for (i, (a_name, a)) in all.iter().enumerate() {
            for (b_name, b) in &all[i + 1..] {
                if a == b {
                    return Err(format!("messages.{a_name} and messages.{b_name} are identical"));
                }
            }
        }
        Ok(())
    }
}
