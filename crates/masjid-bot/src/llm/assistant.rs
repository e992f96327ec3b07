use std::sync::Arc;

use tracing::{info, warn};

use super::error::LLMError;
use super::provider::{LLMProvider, OpenAICompatibleProvider};
use super::types::{ChatRequest, Message};
use crate::config::AiConfig;

const SYSTEM_PROMPT: &str = "Anda adalah asisten AI untuk masjid. Jawab dengan ramah, \
informatif, dan sesuai dengan nilai-nilai Islam. Gunakan bahasa Indonesia.";
const MAX_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

/// Single-turn question answering with a fixed system prompt.
#[derive(Clone)]
pub struct Assistant {
    provider: Option<Arc<dyn LLMProvider>>,
    model: String,
}

impl Assistant {
    /// Build from config; without an API key the assistant is disabled.
    pub fn from_config(config: &AiConfig) -> Result<Self, LLMError> {
        let provider: Option<Arc<dyn LLMProvider>> = match &config.api_key {
            Some(key) => {
                let provider =
                    OpenAICompatibleProvider::new(config.base_url.clone(), Some(key.clone()))?;
                info!(model = %config.model, "Registered OpenRouter provider");
                Some(Arc::new(provider))
            }
            None => {
                warn!("AI chat disabled. Set OPENROUTER_API_KEY to enable it.");
                None
            }
        };
        Ok(Self {
            provider,
            model: config.model.clone(),
        })
    }

    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider: Some(provider),
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn ask(&self, question: &str) -> Result<String, LLMError> {
        let provider = self.provider.as_ref().ok_or(LLMError::NotConfigured)?;
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(question)],
            temperature: Some(TEMPERATURE),
            max_tokens: Some(MAX_TOKENS),
        };

        let response = provider.chat(request).await?;
        response
            .content()
            .map(str::to_string)
            .ok_or(LLMError::EmptyResponse)
    }
}
