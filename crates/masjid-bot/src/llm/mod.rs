//! LLM client for the direct AI chat endpoint.

mod assistant;
mod error;
mod provider;
mod types;

pub use assistant::Assistant;
pub use error::LLMError;
pub use provider::{LLMProvider, OpenAICompatibleProvider};
pub use types::{ChatRequest, ChatResponse, Message, Role};
