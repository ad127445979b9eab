pub mod anthropic;
pub mod catalog;
pub mod factory;
pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use finsage_core::types::{ChatMessage, LLMResponse};
use finsage_core::Result;
use serde_json::Value;

#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse>;
}

pub use anthropic::AnthropicProvider;
pub use catalog::{ProviderSpec, PROVIDERS};
pub use factory::{create_provider, resolve_model};
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
