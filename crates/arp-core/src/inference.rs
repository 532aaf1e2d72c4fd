//! Optional inference capability
//!
//! Components that can use a language model (emergency classification) take a
//! [`SharedInference`]. When nothing is configured the [`RuleBasedBackend`] is
//! injected; it is never available, so callers fall back to their own rules.

use crate::config::EmergencyConfig;
use crate::error::ErrorKind;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Inference failures; all of them mean "use the rules instead"
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("inference backend '{0}' unavailable")]
    Unavailable(String),

    #[error("inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("inference backend returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl InferenceError {
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Unavailable
    }
}

/// Language model capability
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Cheap reachability check
    async fn available(&self) -> bool;

    /// Complete `prompt`
    async fn infer(&self, prompt: &str) -> Result<String, InferenceError>;
}

/// Shared handle injected into components
pub type SharedInference = Arc<dyn InferenceBackend>;

/// Backend that never answers
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedBackend;

#[async_trait]
impl InferenceBackend for RuleBasedBackend {
    fn name(&self) -> &str {
        "rules"
    }

    async fn available(&self) -> bool {
        false
    }

    async fn infer(&self, _prompt: &str) -> Result<String, InferenceError> {
        Err(InferenceError::Unavailable(self.name().to_string()))
    }
}

/// Ollama-compatible HTTP backend
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaBackend {
    #[must_use]
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            timeout: Duration::from_secs(30),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self
            .client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, url = %url, "inference reachability check failed");
                false
            }
        }
    }

    async fn infer(&self, prompt: &str) -> Result<String, InferenceError> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await?
            .error_for_status()?;
        let body: GenerateResponse = resp.json().await?;
        let text = body.response.trim().to_string();
        if text.is_empty() {
            return Err(InferenceError::InvalidResponse("empty completion".into()));
        }
        Ok(text)
    }
}

/// Pick the backend the configuration asks for
#[must_use]
pub fn from_config(config: &EmergencyConfig) -> SharedInference {
    match &config.inference_url {
        Some(url) => Arc::new(
            OllamaBackend::new(url.clone(), config.inference_model.clone())
                .with_timeout(Duration::from_secs(config.inference_timeout_secs)),
        ),
        None => Arc::new(RuleBasedBackend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rule_based_is_never_available() {
        let backend = RuleBasedBackend;
        assert!(!backend.available().await);
        let err = backend.infer("classify").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn config_without_url_selects_rules() {
        let backend = from_config(&EmergencyConfig::default());
        assert_eq!(backend.name(), "rules");
    }

    #[test]
    fn config_with_url_selects_ollama() {
        let config = EmergencyConfig {
            inference_url: Some("http://localhost:11434/".into()),
            ..EmergencyConfig::default()
        };
        assert_eq!(from_config(&config).name(), "ollama");
    }

    #[tokio::test]
    async fn unreachable_ollama_reports_unavailable() {
        // port 9 (discard) is closed on test hosts
        let backend = OllamaBackend::new("http://127.0.0.1:9", "llama3");
        assert!(!backend.available().await);
    }
}
