//! Policy Classifier Adapter: bounded, retried, fail-open classification.
//!
//! ```text
//! classify(content)
//!   ├─ provider[0]: attempt, retry transient errors with backoff
//!   │     └─ schema failure or retries exhausted → next provider
//!   ├─ provider[1]: ...
//!   └─ all failed → Unclassified (fail-open)
//! ```
//!
//! The adapter never returns an error to its caller. Whatever goes wrong at
//! this layer ends as [`ClassificationOutcome::Unclassified`].

use std::borrow::Cow;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::provider::{ClassifierProvider, HttpClassifierProvider};
use super::types::{ClassificationOutcome, ClassificationResult, FailOpenCause};
use crate::config::{ClassifierConfig, OversizePolicy};
use crate::error::ProviderError;

/// A provider plus the name it is logged under.
struct NamedProvider {
    name: String,
    provider: Arc<dyn ClassifierProvider>,
}

/// Fallback chain of classification providers with a shared policy.
pub struct PolicyClassifier {
    providers: Vec<NamedProvider>,
    config: ClassifierConfig,
}

impl PolicyClassifier {
    /// Create an adapter with no providers. Every call fails open until one
    /// is added.
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            providers: Vec::new(),
            config,
        }
    }

    /// Build HTTP providers for every configured endpoint, in order.
    pub fn from_config(config: ClassifierConfig) -> Result<Self, ProviderError> {
        let mut classifier = Self::new(config.clone());
        for endpoint in &config.endpoints {
            let provider = HttpClassifierProvider::new(endpoint, config.timeout())?;
            classifier = classifier.with_provider(&endpoint.name, Arc::new(provider));
        }
        Ok(classifier)
    }

    /// Append a provider to the end of the fallback chain.
    pub fn with_provider(mut self, name: &str, provider: Arc<dyn ClassifierProvider>) -> Self {
        self.providers.push(NamedProvider {
            name: name.to_string(),
            provider,
        });
        self
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Validate and bound the content that will be sent to a provider.
    ///
    /// Blank content is always rejected. Oversized content is truncated on a
    /// character boundary or rejected, depending on [`OversizePolicy`].
    pub fn prepare<'a>(&self, content: &'a str) -> Result<Cow<'a, str>, ProviderError> {
        if content.trim().is_empty() {
            return Err(ProviderError::EmptyContent);
        }

        let limit = self.config.max_content_chars;
        match content.char_indices().nth(limit) {
            None => Ok(Cow::Borrowed(content)),
            Some((cut, _)) => match self.config.oversize_policy {
                OversizePolicy::Truncate => {
                    debug!(limit, "Truncating content before classification");
                    Ok(Cow::Owned(content[..cut].to_string()))
                }
                OversizePolicy::Reject => Err(ProviderError::ContentTooLong {
                    len: content.chars().count(),
                    limit,
                }),
            },
        }
    }

    /// Classify content, failing open on any provider-side problem.
    pub async fn classify(&self, content: &str) -> ClassificationOutcome {
        let text = match self.prepare(content) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Content rejected before classification");
                return ClassificationOutcome::Unclassified(FailOpenCause::from_error(&e, None));
            }
        };

        if self.providers.is_empty() {
            warn!("No classification provider configured; failing open");
            return ClassificationOutcome::Unclassified(FailOpenCause::no_providers());
        }

        let mut last_failure: Option<FailOpenCause> = None;

        for named in &self.providers {
            match self.classify_with_retry(named, &text).await {
                Ok(result) => {
                    debug!(
                        provider = %named.name,
                        is_violation = result.is_violation,
                        severity = %result.severity,
                        confidence = result.confidence,
                        "Content classified"
                    );
                    return ClassificationOutcome::Classified(result);
                }
                Err(e) => {
                    warn!(provider = %named.name, error = %e, "Provider failed; trying next in chain");
                    last_failure = Some(FailOpenCause::from_error(&e, Some(&named.name)));
                }
            }
        }

        let cause = last_failure.unwrap_or_else(FailOpenCause::no_providers);
        warn!(
            kind = %cause.kind,
            provider = cause.provider.as_deref().unwrap_or("none"),
            "All classification providers failed; failing open"
        );
        ClassificationOutcome::Unclassified(cause)
    }

    /// One provider, bounded by the timeout, retried only for transient errors.
    async fn classify_with_retry(
        &self,
        named: &NamedProvider,
        text: &str,
    ) -> Result<ClassificationResult, ProviderError> {
        let timeout = self.config.timeout();
        let retry = &self.config.retry;
        let mut retries_spent = 0u32;

        loop {
            let attempt = tokio::time::timeout(timeout, named.provider.classify(text)).await;
            let err = match attempt {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(timeout),
            };

            if !err.is_transient() || !retry.should_retry(retries_spent) {
                return Err(err);
            }

            retries_spent += 1;
            let backoff = retry.backoff_duration(retries_spent);
            info!(
                provider = %named.name,
                attempt = retries_spent,
                max_retries = retry.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                error = %err,
                "Transient classifier error; retrying"
            );
            tokio::time::sleep(backoff).await;
        }
    }
}
