//! Ordered provider fallback with per-call timeout and bounded retries.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::{
    ConfirmedPerson, OllamaGenerator, OpenAIGenerator, ProviderError, SummaryOptions,
    TextGenerator,
};
use crate::config::ProvidersConfig;
use crate::error::{DocgraphError, Result};

type ProviderFuture<'a, T> =
    Pin<Box<dyn Future<Output = std::result::Result<T, ProviderError>> + Send + 'a>>;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Upper bound on a single provider call.
    pub timeout: Duration,
    /// Extra attempts per provider after the first.
    pub max_retries: usize,
    /// First backoff delay, doubled on each retry.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ProvidersConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            backoff: Duration::from_millis(config.backoff_ms),
        }
    }
}

/// Providers tried in order; the first success wins.
pub struct ProviderChain {
    providers: Vec<Arc<dyn TextGenerator>>,
    policy: RetryPolicy,
}

impl ProviderChain {
    pub fn new(providers: Vec<Arc<dyn TextGenerator>>, policy: RetryPolicy) -> Result<Self> {
        if providers.is_empty() {
            return Err(DocgraphError::Config(
                "No text-generation provider available".to_string(),
            ));
        }
        Ok(Self { providers, policy })
    }

    /// Build the chain in `providers.order`.
    ///
    /// A hosted provider without an API key is skipped with a warning.
    pub fn from_config(config: &ProvidersConfig) -> Result<Self> {
        let http_timeout = Duration::from_secs(config.timeout_secs);
        let mut providers: Vec<Arc<dyn TextGenerator>> = Vec::new();

        for name in &config.order {
            match name.as_str() {
                "ollama" => {
                    providers.push(Arc::new(OllamaGenerator::from_config(&config.ollama, http_timeout)?));
                }
                "openai" => match OpenAIGenerator::from_config(&config.openai, http_timeout)? {
                    Some(gen) => providers.push(Arc::new(gen)),
                    None => log::warn!(
                        "Skipping provider openai: {} is not set",
                        config.openai.api_key_env
                    ),
                },
                other => {
                    return Err(DocgraphError::Config(format!("Unknown provider: {}", other)));
                }
            }
        }

        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        log::info!("Text-generation providers: {}", names.join(" -> "));
        Self::new(providers, RetryPolicy::from_config(config))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn call_with_fallback<'a, T>(
        &'a self,
        task: &str,
        op: impl Fn(&'a dyn TextGenerator) -> ProviderFuture<'a, T>,
    ) -> std::result::Result<T, ProviderError> {
        let mut last_error: Option<ProviderError> = None;
        let mut saw_transient = false;

        for provider in &self.providers {
            let provider: &'a dyn TextGenerator = provider.as_ref();
            let mut delay = self.policy.backoff;
            let mut attempt = 0;

            loop {
                let outcome = match tokio::time::timeout(self.policy.timeout, op(provider)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::retryable(
                        provider.name(),
                        format!("{} timed out after {:?}", task, self.policy.timeout),
                    )),
                };

                match outcome {
                    Ok(value) => {
                        if attempt > 0 || last_error.is_some() {
                            log::info!("{} succeeded via {} (attempt {})", task, provider.name(), attempt + 1);
                        }
                        return Ok(value);
                    }
                    Err(e) if e.retryable && attempt < self.policy.max_retries => {
                        log::warn!(
                            "{} retry {}/{} after error: {}",
                            task,
                            attempt + 1,
                            self.policy.max_retries,
                            e
                        );
                        saw_transient = true;
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        attempt += 1;
                    }
                    Err(e) => {
                        log::warn!("{} failed on {}: {}", task, provider.name(), e);
                        saw_transient |= e.retryable;
                        last_error = Some(e);
                        break;
                    }
                }
            }
        }

        let mut error = last_error
            .unwrap_or_else(|| ProviderError::fatal("chain", format!("{}: no providers", task)));
        // keep the transient marker when any provider was only temporarily unavailable
        error.retryable = saw_transient;
        Err(error)
    }
}

#[async_trait]
impl TextGenerator for ProviderChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        self.call_with_fallback("completion", |p| p.complete(prompt))
            .await
    }

    async fn summarize(
        &self,
        text: &str,
        opts: &SummaryOptions,
    ) -> std::result::Result<String, ProviderError> {
        self.call_with_fallback("summarize", |p| p.summarize(text, opts))
            .await
    }

    async fn extract_keywords(
        &self,
        text: &str,
        max_count: usize,
    ) -> std::result::Result<Vec<String>, ProviderError> {
        self.call_with_fallback("extract_keywords", |p| p.extract_keywords(text, max_count))
            .await
    }

    async fn validate_candidate_names(
        &self,
        text: &str,
        title: &str,
        candidates: &[String],
    ) -> std::result::Result<Vec<ConfirmedPerson>, ProviderError> {
        self.call_with_fallback("validate_candidate_names", |p| {
            p.validate_candidate_names(text, title, candidates)
        })
        .await
    }
}
