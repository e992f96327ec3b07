//! LLM provider trait and the OpenAI-compatible implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::error::LLMError;
use super::types::{ChatRequest, ChatResponse};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait for LLM providers with different API formats.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Make a chat completion request.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError>;
}

/// OpenAI-compatible provider (works for OpenRouter, OpenAI, Ollama).
pub struct OpenAICompatibleProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAICompatibleProvider {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, LLMError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAICompatibleProvider {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let response = req.json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::Api { status, message });
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("Kapan maghrib?")],
            temperature: Some(0.7),
            max_tokens: Some(500),
        }
    }

    #[tokio::test]
    async fn sends_bearer_token_and_parses_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "test-model", "max_tokens": 500 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "gen-1",
                "choices": [{ "message": { "role": "assistant", "content": "18:05 WIB" } }]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAICompatibleProvider::new(server.uri(), Some("sk-test".to_string())).unwrap();
        let response = provider.chat(request()).await.unwrap();
        assert_eq!(response.content(), Some("18:05 WIB"));
    }

    #[tokio::test]
    async fn error_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let provider = OpenAICompatibleProvider::new(server.uri(), None).unwrap();
        let err = provider.chat(request()).await.unwrap_err();
        assert!(matches!(err, LLMError::Api { status: 401, ref message } if message == "bad key"));
    }
}
