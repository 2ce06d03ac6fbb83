//! Classification result types and the strict response parser.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// First `{` through last `}`; providers that wrap JSON in prose still parse.
static JSON_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("JSON_OBJECT_RE regex should compile"));

/// Severity reported by the classifier. Informational only; escalation is
/// driven by strike count, never by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A validated classifier verdict.
///
/// Every field is required on the wire. There are no defaults: a missing
/// field is a [`ProviderError::InvalidResponse`], never "not a violation".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClassificationResult {
    pub is_violation: bool,
    pub severity: Severity,
    pub reason: String,
    /// Always within [0, 1].
    pub confidence: f64,
}

impl ClassificationResult {
    /// Check the constraints serde cannot express.
    pub fn validate(self) -> Result<Self, ProviderError> {
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ProviderError::InvalidResponse(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        if self.is_violation && self.reason.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "violation reported without a reason".to_string(),
            ));
        }
        Ok(self)
    }
}

/// Parse a provider payload into a [`ClassificationResult`].
///
/// Accepts either a bare JSON object or text containing one.
pub fn parse_classification(raw: &str) -> Result<ClassificationResult, ProviderError> {
    let object = JSON_OBJECT_RE
        .find(raw)
        .ok_or_else(|| ProviderError::InvalidResponse("no JSON object in response".to_string()))?;

    let result: ClassificationResult = serde_json::from_str(object.as_str())
        .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    result.validate()
}

/// Why a classification could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailOpenCause {
    /// Error kind of the last failure (see [`ProviderError::kind`]).
    pub kind: String,
    pub detail: String,
    /// Last provider tried, if any.
    pub provider: Option<String>,
}

impl FailOpenCause {
    pub fn from_error(error: &ProviderError, provider: Option<&str>) -> Self {
        Self {
            kind: error.kind().to_string(),
            detail: error.to_string(),
            provider: provider.map(str::to_string),
        }
    }

    pub fn no_providers() -> Self {
        Self {
            kind: "no_providers".to_string(),
            detail: "no classification provider configured".to_string(),
            provider: None,
        }
    }
}

/// What the adapter hands the engine.
///
/// `Unclassified` must be treated exactly like a non-violation for state
/// purposes, but it stays distinguishable so it can be audited.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    Classified(ClassificationResult),
    Unclassified(FailOpenCause),
}

impl ClassificationOutcome {
    pub fn is_unclassified(&self) -> bool {
        matches!(self, Self::Unclassified(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_schema() {
        let raw = r#"{"isViolation":true,"severity":"MEDIUM","reason":"personal attack","confidence":0.92}"#;
        let r = parse_classification(raw).unwrap();
        assert!(r.is_violation);
        assert_eq!(r.severity, Severity::Medium);
        assert_eq!(r.reason, "personal attack");
    }

    #[test]
    fn extracts_object_from_surrounding_text() {
        let raw = "Here is my analysis:\n```json\n{\"isViolation\": false, \"severity\": \"LOW\", \"reason\": \"business criticism\", \"confidence\": 0.8}\n```";
        let r = parse_classification(raw).unwrap();
        assert!(!r.is_violation);
    }

    #[test]
    fn missing_field_is_an_error_not_a_default() {
        let raw = r#"{"isViolation":true,"severity":"HIGH","reason":"threat"}"#;
        let err = parse_classification(raw).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn unknown_severity_is_rejected() {
        let raw = r#"{"isViolation":true,"severity":"CRITICAL","reason":"x","confidence":0.9}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn lowercase_severity_is_rejected() {
        let raw = r#"{"isViolation":true,"severity":"high","reason":"x","confidence":0.9}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn extra_fields_are_rejected() {
        let raw = r#"{"isViolation":false,"severity":"LOW","reason":"ok","confidence":0.1,"category":"SPAM"}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let raw = r#"{"isViolation":true,"severity":"LOW","reason":"rude","confidence":1.7}"#;
        assert!(parse_classification(raw).is_err());
        let raw = r#"{"isViolation":true,"severity":"LOW","reason":"rude","confidence":-0.1}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn string_typed_fields_are_rejected() {
        let raw = r#"{"isViolation":"true","severity":"LOW","reason":"rude","confidence":0.9}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn violation_needs_a_reason() {
        let raw = r#"{"isViolation":true,"severity":"LOW","reason":"  ","confidence":0.9}"#;
        assert!(parse_classification(raw).is_err());
    }

    #[test]
    fn plain_text_is_rejected() {
        let err = parse_classification("I cannot help with that.").unwrap_err();
        assert!(err.to_string().contains("no JSON object"));
    }
}
