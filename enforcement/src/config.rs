//! Engine configuration.
//!
//! Defaults are compiled in; a TOML file may override any subset, and
//! `MODERATION_*` environment variables override both.
//!
//! ```toml
//! ledger_path = "/var/lib/moderation/ledger"
//!
//! [classifier]
//! max_content_chars = 4000
//! timeout_ms = 5000
//! confidence_threshold = 0.6
//!
//! [[classifier.endpoints]]
//! name = "primary"
//! url = "http://classifier.internal/v1/classify"
//!
//! [escalation]
//! ban_threshold = 4
//!
//! # Stricter policy for one channel
//! [policies.direct_messages]
//! confidence_threshold = 0.8
//! block_severities = ["MEDIUM", "HIGH"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::classifier::Severity;
use crate::escalation::messages::MessageTemplates;

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-indexed; 0 means first try).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed given the retries already spent.
    pub fn should_retry(&self, retries_spent: u32) -> bool {
        retries_spent < self.max_retries
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    /// No retries, no waiting. Handy in tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: 0,
            backoff_multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }
}

impl Default for RetryPolicy {
    /// Default: 2 retries, 250ms initial backoff, 2x multiplier, 2s max.
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 250,
            backoff_multiplier: 2.0,
            max_backoff_ms: 2_000,
        }
    }
}

/// What to do with content longer than `max_content_chars`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Classify only the first `max_content_chars` characters.
    Truncate,
    /// Refuse the submission as invalid input without calling a provider.
    Reject,
}

/// A classification provider endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub max_content_chars: usize,
    pub oversize_policy: OversizePolicy,
    /// Per-request timeout.
    pub timeout_ms: u64,
    pub retry: RetryPolicy,
    /// A violation must be strictly more confident than this to count.
    pub confidence_threshold: f64,
    /// Ordered fallback chain; earlier entries are preferred.
    pub endpoints: Vec<EndpointConfig>,
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 4_000,
            oversize_policy: OversizePolicy::Truncate,
            timeout_ms: 5_000,
            retry: RetryPolicy::default(),
            confidence_threshold: 0.6,
            endpoints: Vec::new(),
        }
    }
}

/// Configuration for the Escalation Engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Strike count at which the identity is banned.
    pub ban_threshold: u32,
    /// Optimistic commit attempts before the transition fails loudly.
    pub max_commit_attempts: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            ban_threshold: 4,
            max_commit_attempts: 5,
        }
    }
}

/// Which verdicts count as strikes on one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationPolicy {
    /// A violation must be strictly more confident than this to count.
    pub confidence_threshold: f64,
    /// Severities that count. Empty means every severity counts.
    pub block_severities: Vec<Severity>,
}

impl ModerationPolicy {
    pub fn with_confidence_threshold(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            block_severities: Vec::new(),
        }
    }

    pub fn blocks(&self, severity: Severity) -> bool {
        self.block_severities.is_empty() || self.block_severities.contains(&severity)
    }
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self::with_confidence_threshold(ClassifierConfig::default().confidence_threshold)
    }
}

/// Outbound ban-event delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub webhook_url: Option<String>,
    pub poll_interval_ms: u64,
    /// Attempts per event per relay pass before leaving it for the next pass.
    pub max_delivery_attempts: u32,
    pub timeout_ms: u64,
}

impl RelayConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            poll_interval_ms: 1_000,
            max_delivery_attempts: 5,
            timeout_ms: 10_000,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub classifier: ClassifierConfig,
    pub escalation: EscalationConfig,
    pub messages: MessageTemplates,
    pub relay: RelayConfig,
    /// Named per-channel policies. Channels without an entry use
    /// [`EngineConfig::default_policy`].
    pub policies: BTreeMap<String, ModerationPolicy>,
    /// RocksDB directory for the durable ledger.
    pub ledger_path: Option<PathBuf>,
}

impl EngineConfig {
    /// Policy for submissions that name no channel.
    pub fn default_policy(&self) -> ModerationPolicy {
        ModerationPolicy::with_confidence_threshold(self.classifier.confidence_threshold)
    }

    /// Parse a TOML document.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Apply `MODERATION_*` environment overrides in place.
    pub fn apply_env(&mut self) {
        if let Ok(path) = std::env::var("MODERATION_LEDGER_PATH") {
            self.ledger_path = Some(PathBuf::from(path));
        }
        if let Ok(url) = std::env::var("MODERATION_CLASSIFIER_URL") {
            let api_key = std::env::var("MODERATION_CLASSIFIER_API_KEY").ok();
            // An env-provided endpoint becomes the primary; file entries stay as fallbacks.
            self.classifier.endpoints.insert(
                0,
                EndpointConfig {
                    name: "env".to_string(),
                    url,
                    api_key,
                },
            );
        }
        if let Ok(val) = std::env::var("MODERATION_CLASSIFIER_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.classifier.timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("MODERATION_MAX_CONTENT_CHARS") {
            if let Ok(n) = val.parse() {
                self.classifier.max_content_chars = n;
            }
        }
        if let Ok(val) = std::env::var("MODERATION_CONFIDENCE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.classifier.confidence_threshold = n;
            }
        }
        if let Ok(val) = std::env::var("MODERATION_BAN_THRESHOLD") {
            if let Ok(n) = val.parse() {
                self.escalation.ban_threshold = n;
            }
        }
        if let Ok(url) = std::env::var("MODERATION_WEBHOOK_URL") {
            self.relay.webhook_url = Some(url);
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.escalation.ban_threshold < 2 {
            return Err(ConfigError::Invalid(format!(
                "ban_threshold must be at least 2, got {}",
                self.escalation.ban_threshold
            )));
        }
        if self.escalation.max_commit_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_commit_attempts must be at least 1".to_string(),
            ));
        }
        if self.classifier.max_content_chars == 0 {
            return Err(ConfigError::Invalid(
                "max_content_chars must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.classifier.confidence_threshold
            )));
        }
        for (channel, policy) in &self.policies {
            if !(0.0..=1.0).contains(&policy.confidence_threshold) {
                return Err(ConfigError::Invalid(format!(
                    "policies.{channel}.confidence_threshold must be within [0, 1], got {}",
                    policy.confidence_threshold
                )));
            }
        }
        self.messages.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.escalation.ban_threshold, 4);
        assert_eq!(cfg.escalation.max_commit_attempts, 5);
        assert_eq!(cfg.classifier.timeout(), Duration::from_secs(5));
        assert!((cfg.classifier.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
            [classifier]
            timeout_ms = 1500

            [[classifier.endpoints]]
            name = "primary"
            url = "http://localhost:9000/classify"

            [escalation]
            ban_threshold = 5
        "#;
        let cfg = EngineConfig::from_toml_str(raw, Path::new("inline.toml")).unwrap();
        assert_eq!(cfg.classifier.timeout_ms, 1500);
        assert_eq!(cfg.classifier.max_content_chars, 4_000);
        assert_eq!(cfg.classifier.endpoints.len(), 1);
        assert_eq!(cfg.classifier.endpoints[0].api_key, None);
        assert_eq!(cfg.escalation.ban_threshold, 5);
        assert_eq!(cfg.escalation.max_commit_attempts, 5);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("[classifier\n", Path::new("bad.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = EngineConfig::default();
        cfg.classifier.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.escalation.ban_threshold = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn channel_policies_parse_from_toml() {
        let raw = r#"
            [policies.direct_messages]
            confidence_threshold = 0.8
            block_severities = ["MEDIUM", "HIGH"]

            [policies.comments]
            confidence_threshold = 0.7
        "#;
        let cfg = EngineConfig::from_toml_str(raw, Path::new("inline.toml")).unwrap();
        let dm = &cfg.policies["direct_messages"];
        assert!((dm.confidence_threshold - 0.8).abs() < f64::EPSILON);
        assert!(!dm.blocks(Severity::Low));
        assert!(dm.blocks(Severity::High));
        assert!(cfg.policies["comments"].blocks(Severity::Low));
        assert!(cfg.validate().is_ok());

        let mut cfg = cfg;
        cfg.policies
            .insert("broken".to_string(), ModerationPolicy::with_confidence_threshold(2.0));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_ms(0), 0);
        assert_eq!(policy.backoff_ms(1), 250);
        assert_eq!(policy.backoff_ms(2), 500);
        assert_eq!(policy.backoff_ms(10), 2_000);
        assert!(policy.should_retry(1));
        assert!(!policy.should_retry(2));
    }
}
