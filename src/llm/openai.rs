use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ProviderError, TextGenerator};
use crate::config::OpenAIConfig;
use crate::error::{DocgraphError, Result};

const PROVIDER: &str = "openai";

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

/// Request structure for the chat completions API
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

/// Response structure from the chat completions API
#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Hosted provider using an OpenAI-compatible chat completions endpoint
pub struct OpenAIGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAIGenerator {
    /// Create a new OpenAI generator
    ///
    /// # Arguments
    ///
    /// * `api_key` - API key sent as a bearer token
    /// * `model` - Model name (e.g., "gpt-4o-mini")
    /// * `base_url` - API root, e.g. "https://api.openai.com/v1"
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(api_key: String, model: &str, base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocgraphError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build from config, reading the key from the configured env var.
    ///
    /// Returns `Ok(None)` when the key is not set.
    pub fn from_config(config: &OpenAIConfig, timeout: Duration) -> Result<Option<Self>> {
        match std::env::var(&config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => {
                Self::new(key, &config.model, &config.base_url, timeout).map(Some)
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = CompletionRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
        };

        let start = std::time::Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(PROVIDER, e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ProviderError::from_status(PROVIDER, status.as_u16(), &body));
        }

        let result: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::fatal(PROVIDER, format!("Failed to parse response: {}", e)))?;

        log::debug!("Completion API call took {:?}", start.elapsed());

        result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::fatal(PROVIDER, "Empty response from completions API"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAIGenerator {
        OpenAIGenerator::new(
            "test-key".to_string(),
            "gpt-4o-mini",
            &format!("{}/v1", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_keywords_from_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "rust, tokio, sqlite"}}]
            })))
            .mount(&server)
            .await;

        let keywords = generator(&server).extract_keywords("text", 15).await.unwrap();
        assert_eq!(keywords, vec!["rust", "tokio", "sqlite"]);
    }

    #[tokio::test]
    async fn test_rate_limit_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = generator(&server).complete("hi").await.unwrap_err();
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let err = generator(&server).complete("hi").await.unwrap_err();
        assert!(!err.retryable);
    }

    #[test]
    fn test_from_config_without_key() {
        let config = OpenAIConfig {
            model: "gpt-4o-mini".to_string(),
            api_key_env: "DOCGRAPH_TEST_UNSET_OPENAI_KEY".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        };
        let gen = OpenAIGenerator::from_config(&config, Duration::from_secs(5)).unwrap();
        assert!(gen.is_none());
    }
}
