//! Text-generation providers behind one capability interface.
//!
//! Every provider only has to answer a raw prompt; summary, keyword, and
//! name-validation requests are built on top of that in the trait's provided
//! methods so all backends parse responses the same way.

pub mod chain;
pub mod ollama;
pub mod openai;
pub mod prompts;
pub mod stub;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use chain::{ProviderChain, RetryPolicy};
pub use ollama::OllamaGenerator;
pub use openai::OpenAIGenerator;
pub use stub::StubGenerator;

/// A failed provider call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{provider}: {message}")]
pub struct ProviderError {
    pub provider: String,
    pub message: String,
    /// Rate limits, timeouts, and 5xx responses.
    pub retryable: bool,
}

impl ProviderError {
    pub fn retryable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(provider: &str, status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, body);
        if status == 429 || status >= 500 {
            Self::retryable(provider, message)
        } else {
            Self::fatal(provider, message)
        }
    }

    pub fn from_reqwest(provider: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            Self::retryable(provider, format!("Network error: {}", e))
        } else {
            Self::fatal(provider, format!("Request error: {}", e))
        }
    }
}

/// Which summary the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStrategy {
    /// Short human-readable overview.
    #[default]
    General,
    /// Dense listing of searchable facts.
    Retrieval,
}

#[derive(Debug, Clone, Default)]
pub struct SummaryOptions {
    pub strategy: SummaryStrategy,
    pub title: Option<String>,
}

impl SummaryOptions {
    pub fn general(title: &str) -> Self {
        Self {
            strategy: SummaryStrategy::General,
            title: Some(title.to_string()),
        }
    }

    pub fn retrieval(title: &str) -> Self {
        Self {
            strategy: SummaryStrategy::Retrieval,
            title: Some(title.to_string()),
        }
    }
}

/// A candidate name the provider confirmed as a real person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedPerson {
    pub name: String,
    pub confidence: f64,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

impl ConfirmedPerson {
    pub fn new(name: &str, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            confidence,
            department: None,
            role: None,
            email: None,
            context: None,
        }
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Send one prompt and return the raw completion.
    async fn complete(&self, prompt: &str) -> Result<String, ProviderError>;

    async fn summarize(&self, text: &str, opts: &SummaryOptions) -> Result<String, ProviderError> {
        let raw = self.complete(&prompts::summary_prompt(text, opts)).await?;
        let summary = prompts::clean_summary(&raw);
        if summary.is_empty() {
            return Err(ProviderError::fatal(self.name(), "empty summary"));
        }
        Ok(summary)
    }

    async fn extract_keywords(&self, text: &str, max_count: usize) -> Result<Vec<String>, ProviderError> {
        let raw = self.complete(&prompts::keywords_prompt(text, max_count)).await?;
        Ok(prompts::parse_keywords(&raw, max_count))
    }

    /// Ask the provider which candidates are genuine person names.
    async fn validate_candidate_names(
        &self,
        text: &str,
        title: &str,
        candidates: &[String],
    ) -> Result<Vec<ConfirmedPerson>, ProviderError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self
            .complete(&prompts::person_prompt(text, title, candidates))
            .await?;
        prompts::parse_confirmed_persons(&raw).map_err(|e| ProviderError::fatal(self.name(), e))
    }
}
