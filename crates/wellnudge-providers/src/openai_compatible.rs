//! Unified OpenAI-compatible provider.
//!
//! A single struct handles chat completions for every registered backend.
//! Providers differ only by endpoint URL, API key and default model.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;
use wellnudge_core::config::LlmConfig;
use wellnudge_core::error::{Result, WellnudgeError};
use wellnudge_core::traits::provider::{GenerateParams, LlmProvider};
use wellnudge_core::types::{ChatMessage, Role};

use crate::provider_registry::ProviderConfig;

/// System instruction injected when a conversation does not start with one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an office health assistant. Use only the facts provided. Never give a medical diagnosis.";

/// Replies longer than this are rejected as malformed.
const MAX_RESPONSE_CHARS: usize = 2000;

/// A unified provider that works with any OpenAI-compatible API.
pub struct OpenAiCompatibleProvider {
    name: String,
    api_key: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    base_url: String,
    chat_path: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    /// Create from a registry entry + LLM config.
    ///
    /// Resolution order:
    /// - API key: `llm.api_keys[name]` > registry env vars > empty
    /// - Base URL: `llm.endpoints[name]` > registry default
    pub fn from_registry(registry: &ProviderConfig, config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_keys
            .get(registry.name)
            .filter(|k| !k.is_empty())
            .cloned()
            .unwrap_or_else(|| {
                registry
                    .env_keys
                    .iter()
                    .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
                    .unwrap_or_default()
            });

        let base_url = config
            .endpoints
            .get(registry.name)
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| registry.base_url.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WellnudgeError::Http(format!("{} client build failed: {e}", registry.name)))?;

        Ok(Self {
            name: registry.name.to_string(),
            api_key,
            base_url,
            chat_path: registry.chat_path.to_string(),
            default_model: registry.default_model.to_string(),
            client,
        })
    }

    /// Build with explicit values (tests, custom gateways).
    pub fn new(name: &str, base_url: &str, api_key: &str, default_model: &str) -> Self {
        Self {
            name: name.to_string(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            chat_path: "/chat/completions".to_string(),
            default_model: default_model.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Build the JSON request body.
    fn request_body(&self, messages: &[ChatMessage], params: &GenerateParams) -> Value {
        let model = params
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        json!({
            "model": model,
            "messages": format_messages(messages),
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        })
    }
}

/// Ensure the conversation opens with a system message.
pub fn format_messages(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    match messages.first() {
        Some(first) if first.role == Role::System => messages.to_vec(),
        _ => {
            let mut out = Vec::with_capacity(messages.len() + 1);
            out.push(ChatMessage::system(DEFAULT_SYSTEM_PROMPT));
            out.extend_from_slice(messages);
            out
        }
    }
}

/// Reject empty or oversized replies.
pub fn validate_response(text: &str) -> bool {
    if text.trim().is_empty() {
        tracing::warn!("⚠️ Empty LLM response");
        return false;
    }
    let len = text.chars().count();
    if len > MAX_RESPONSE_CHARS {
        tracing::warn!("⚠️ LLM response too long ({len} chars)");
        return false;
    }
    true
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(&self, messages: &[ChatMessage], params: &GenerateParams) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(WellnudgeError::ApiKeyMissing(self.name.clone()));
        }

        let url = format!("{}{}", self.base_url, self.chat_path);
        let body = self.request_body(messages, params);

        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                WellnudgeError::Http(format!("{} connection failed ({}): {}", self.name, url, e))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(WellnudgeError::Provider(format!(
                "{} API error {}: {}",
                self.name, status, text
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| WellnudgeError::Http(e.to_string()))?;

        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .unwrap_or_default()
            .to_string();

        if let Some(usage) = json["usage"].as_object() {
            let prompt = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let completion = usage.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0);
            tracing::debug!(
                "🧮 {} tokens: prompt={prompt} completion={completion}",
                self.name
            );
        }

        if !validate_response(&content) {
            return Err(WellnudgeError::Provider(format!(
                "{} returned an invalid response",
                self.name
            )));
        }
        Ok(content)
    }
}
