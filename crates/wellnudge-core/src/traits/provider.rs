//! LLM provider capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ChatMessage;

/// Generation parameters for a single chat call.
#[derive(Debug, Clone)]
pub struct GenerateParams {
    /// Model override; `None` uses the provider's default model.
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerateParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.7,
            max_tokens: 512,
        }
    }
}

/// One interchangeable LLM backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Registry name ("openai", "deepseek", ...).
    fn name(&self) -> &str;

    /// Whether credentials are present. Unconfigured providers are skipped by the router.
    fn is_configured(&self) -> bool;

    /// Run a chat completion and return the reply text.
    async fn chat(&self, messages: &[ChatMessage], params: &GenerateParams) -> Result<String>;
}
