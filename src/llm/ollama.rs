use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ProviderError, TextGenerator};
use crate::config::OllamaConfig;
use crate::error::{DocgraphError, Result};

const PROVIDER: &str = "ollama";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatOptions {
    temperature: f32,
}

/// Request body for Ollama's `/api/chat`
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// Self-hosted provider talking to a local Ollama server
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    /// Create a new Ollama generator
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server root, e.g. "http://localhost:11434"
    /// * `model` - Model tag, e.g. "gemma3:4b"
    /// * `timeout` - Per-request HTTP timeout
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DocgraphError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &OllamaConfig, timeout: Duration) -> Result<Self> {
        Self::new(&config.url, &config.model, timeout)
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: false,
            options: ChatOptions { temperature: 0.7 },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::fatal(PROVIDER, format!("Failed to parse response: {}", e)))?;

        Ok(parsed.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::SummaryOptions;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OllamaGenerator {
        OllamaGenerator::new(&server.uri(), "gemma3:4b", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_summarize_posts_chat_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({"model": "gemma3:4b", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": {"role": "assistant", "content": "A short summary."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let summary = generator(&server)
            .summarize("long text", &SummaryOptions::general("Title"))
            .await
            .unwrap();
        assert_eq!(summary, "A short summary.");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let err = generator(&server).complete("hi").await.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.provider, "ollama");
    }

    #[tokio::test]
    async fn test_missing_model_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .mount(&server)
            .await;

        let err = generator(&server).complete("hi").await.unwrap_err();
        assert!(!err.retryable);
        assert!(err.message.contains("model not found"));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_retryable() {
        let gen = OllamaGenerator::new("http://127.0.0.1:1", "m", Duration::from_secs(2)).unwrap();
        let err = gen.complete("hi").await.unwrap_err();
        assert!(err.retryable);
    }
}
