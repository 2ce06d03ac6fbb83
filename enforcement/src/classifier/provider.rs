//! Classification providers.
//!
//! A provider is one external model endpoint. It performs a single attempt
//! and reports failures as [`ProviderError`]; retries, timeouts and the
//! fallback chain live in [`super::adapter::PolicyClassifier`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::types::{parse_classification, ClassificationResult};
use crate::config::EndpointConfig;
use crate::error::ProviderError;

/// One classification backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClassifierProvider: Send + Sync {
    /// Classify `content` once. Must not retry internally.
    async fn classify(&self, content: &str) -> Result<ClassificationResult, ProviderError>;
}

/// Wire request: `{ "content": "..." }`.
#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    content: &'a str,
}

/// JSON-over-HTTP provider.
///
/// POSTs `{content}` and expects the strict four-field verdict back, either
/// as the whole body or embedded in it.
pub struct HttpClassifierProvider {
    url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpClassifierProvider {
    pub fn new(endpoint: &EndpointConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: endpoint.url.clone(),
            api_key: endpoint.api_key.clone(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ClassifierProvider for HttpClassifierProvider {
    async fn classify(&self, content: &str) -> Result<ClassificationResult, ProviderError> {
        let start = std::time::Instant::now();

        let mut request = self.client.post(&self.url).json(&ClassifyRequest { content });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(start.elapsed())
            } else {
                ProviderError::from(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await?;
        debug!(
            url = %self.url,
            latency_ms = start.elapsed().as_millis() as u64,
            "Classifier responded"
        );
        parse_classification(&body)
    }
}
