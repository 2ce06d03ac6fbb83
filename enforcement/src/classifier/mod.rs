//! Policy Classifier Adapter
//!
//! Wraps external classification capabilities behind a strict response
//! contract. Malformed or missing verdicts are errors at the type level and
//! end as [`ClassificationOutcome::Unclassified`], never as "no violation".

pub mod adapter;
pub mod provider;
pub mod types;

pub use adapter::PolicyClassifier;
pub use provider::{ClassifierProvider, HttpClassifierProvider};
pub use types::{
    parse_classification, ClassificationOutcome, ClassificationResult, FailOpenCause, Severity,
};
