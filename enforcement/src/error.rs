//! Error taxonomy for the enforcement engine.
//!
//! | Layer       | Type               | Caller-visible | Handling                    |
//! |-------------|--------------------|----------------|-----------------------------|
//! | Classifier  | [`ProviderError`]  | never          | retried if transient, then fail-open |
//! | Ledger      | [`LedgerError`]    | via [`EnforcementError::Persistence`] | surfaced |
//! | Escalation  | [`EnforcementError::ConflictRetriesExhausted`] | yes | surfaced |
//! | Relay       | [`DeliveryError`]  | never          | left pending, retried next pass |
//! | Input       | [`EnforcementError::InvalidContent`] | yes | rejected before the gate |
//!
//! "Already banned" is an outcome, not an error, and has no variant here.

use std::time::Duration;

use thiserror::Error;

/// Generic user-facing text for any hard failure. Never implies the content
/// was accepted.
pub const TRY_AGAIN_MESSAGE: &str =
    "We could not process your submission right now. Please try again in a moment.";

const EMPTY_CONTENT_MESSAGE: &str = "Your submission is empty.";

const CONTENT_TOO_LONG_MESSAGE: &str = "Your submission is too long.";

/// Failure talking to, or understanding, a classification provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("classification request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("content is empty")]
    EmptyContent,

    #[error("content length {len} exceeds limit of {limit} characters")]
    ContentTooLong { len: usize, limit: usize },
}

impl ProviderError {
    /// Whether a retry against the same provider could plausibly succeed.
    ///
    /// Schema and input failures are deterministic and never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Transport(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::EmptyContent | Self::ContentTooLong { .. } => false,
        }
    }

    /// Short machine-readable label used in events and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::InvalidResponse(_) => "invalid_response",
            Self::EmptyContent => "empty_content",
            Self::ContentTooLong { .. } => "content_too_long",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Failure handing a ban event to a downstream sink. Always retried later.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("sink returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
}

impl From<reqwest::Error> for DeliveryError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Error type for ledger operations
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),

    #[error("Refusing to ban {identity_id} at {warning_count} warnings (threshold {ban_threshold})")]
    BanBelowThreshold {
        identity_id: String,
        warning_count: u32,
        ban_threshold: u32,
    },
}

#[cfg(feature = "heavy-state")]
impl From<rocksdb::Error> for LedgerError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.into_string())
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Hard failures surfaced to the caller of `submit_for_moderation`.
#[derive(Debug, Error)]
pub enum EnforcementError {
    #[error("ledger failure: {0}")]
    Persistence(#[from] LedgerError),

    #[error("gave up on identity {identity_id} after {attempts} conflicting commit attempts")]
    ConflictRetriesExhausted { identity_id: String, attempts: u32 },

    #[error("invalid submission: {0}")]
    InvalidContent(ProviderError),
}

impl EnforcementError {
    /// The only text an end user ever sees for a failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidContent(ProviderError::ContentTooLong { .. }) => CONTENT_TOO_LONG_MESSAGE,
            Self::InvalidContent(_) => EMPTY_CONTENT_MESSAGE,
            Self::Persistence(_) | Self::ConflictRetriesExhausted { .. } => TRY_AGAIN_MESSAGE,
        }
    }

    /// Whether the caller's input, not the engine, is at fault.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidContent(_))
    }
}

/// Result type for engine operations
pub type EnforcementResult<T> = Result<T, EnforcementError>;
