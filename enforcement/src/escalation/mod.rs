//! Escalation Engine: deterministic sanction state machine
//!
//! Maps each confirmed violation onto the next tier of the ladder using the
//! ledger's conditional commit. No classifier calls happen in this module.
//!
//! # Escalation Ladder
//!
//! ```text
//! CLEAN (0)
//!     │  confirmed violation
//!     ▼
//! WARN_1 (1) ──▶ WARN_2 (2) ──▶ WARN_FINAL (3)
//!                                   │  next violation
//!                                   ▼
//!                              BANNED (≥4)
//!                                   │  ban fields + outbox entry in the same commit
//!                                   ▼
//!                              Enforcement Action Emitter
//! ```
//!
//! Non-violations, low-confidence verdicts and fail-open outcomes never
//! reach this module.

pub mod engine;
pub mod messages;
pub mod tier;

pub use engine::{EscalationDecision, EscalationEngine};
pub use messages::{MessageTemplates, DEFAULT_BANNED_NOTICE};
pub use tier::{OutcomeTier, SanctionTier};
