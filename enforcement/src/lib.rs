//! Content Enforcement Library
//!
//! This library provides:
//! - A fail-open policy classifier over a chain of external providers
//! - A violation ledger with optimistic, conditional commits
//! - A deterministic strike ladder ending in an idempotent ban
//! - A transactional outbox relaying ban events to refund/notification consumers
//!
//! # Flow
//!
//! ```text
//! submit_for_moderation(content, identity)
//!   ├─ IdentityGate::can_submit        banned → rejected, no classifier call
//!   ├─ PolicyClassifier::classify      unclassified → allowed + anomaly event
//!   ├─ confidence threshold            not a confirmed violation → allowed
//!   └─ EscalationEngine::record_violation
//!         ├─ WARN_1 / WARN_2 / WARN_FINAL → rejected with warning text
//!         └─ BANNED → EnforcementEmitter::enforce_ban → outbox → OutboxRelay
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use enforcement::{EngineConfig, InMemoryLedger, ModerationService, PolicyClassifier};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_env();
//! let classifier = PolicyClassifier::from_config(config.classifier.clone())?;
//! let service = ModerationService::new(Arc::new(InMemoryLedger::new()), classifier, &config);
//!
//! let outcome = service
//!     .submit_for_moderation("hello everyone", &"user-42".into())
//!     .await?;
//! assert!(outcome.allowed);
//! # Ok(())
//! # }
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod classifier;
pub mod config;
pub mod emitter;
pub mod error;
pub mod escalation;
pub mod events;
pub mod gate;
pub mod ledger;
pub mod moderation;
pub mod relay;

// Re-export key classifier types
pub use classifier::{
    parse_classification, ClassificationOutcome, ClassificationResult, ClassifierProvider,
    FailOpenCause, HttpClassifierProvider, PolicyClassifier, Severity,
};

// Re-export key ledger types
#[cfg(feature = "heavy-state")]
pub use ledger::RocksLedger;
pub use ledger::{
    BanEvent, CommitResult, IdentityId, InMemoryLedger, OutboxEntry, SanctionState,
    SharedLedger, ViolationCommit, ViolationLedger, ViolationRecord,
};

// Re-export escalation, enforcement and delivery
pub use emitter::EnforcementEmitter;
pub use escalation::{
    EscalationDecision, EscalationEngine, MessageTemplates, OutcomeTier, SanctionTier,
};
pub use gate::{GateDecision, IdentityGate};
pub use relay::{BanEventSink, OutboxRelay, RelayReport, WebhookSink};

// Re-export orchestration, config, errors and events
pub use config::{
    ClassifierConfig, ConfigError, EndpointConfig, EngineConfig, EscalationConfig,
    ModerationPolicy, OversizePolicy, RelayConfig, RetryPolicy,
};
pub use error::{
    DeliveryError, EnforcementError, EnforcementResult, LedgerError, LedgerResult,
    ProviderError, TRY_AGAIN_MESSAGE,
};
pub use events::{EventBus, EventFilter, ModerationEvent, SharedEventBus};
pub use moderation::{ModerationOutcome, ModerationService};
