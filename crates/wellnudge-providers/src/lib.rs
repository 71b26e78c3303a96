//! # Wellnudge Providers
//!
//! LLM backends for Wellnudge.
//!
//! OpenAI, DeepSeek and Tongyi (DashScope compatible mode) all speak the
//! chat-completions dialect and are handled by a single
//! `OpenAiCompatibleProvider`. The `ProviderRouter` chains them with failover.

pub mod openai_compatible;
pub mod provider_registry;
pub mod router;

use std::time::Duration;
use wellnudge_core::config::WellnudgeConfig;
use wellnudge_core::error::{Result, WellnudgeError};
use wellnudge_core::traits::LlmProvider;

pub use router::{ProviderRouter, is_error};

/// Create a single provider by registry name.
pub fn create_provider(name: &str, config: &WellnudgeConfig) -> Result<Box<dyn LlmProvider>> {
    let registry = provider_registry::get_provider_config(name)
        .ok_or_else(|| WellnudgeError::ProviderNotFound(name.into()))?;
    Ok(Box::new(
        openai_compatible::OpenAiCompatibleProvider::from_registry(registry, &config.llm)?,
    ))
}

/// Build the router with every registered provider.
///
/// Unknown names in `llm.provider` / `llm.fallback_order` are logged and
/// ignored; providers without credentials stay registered but unavailable.
pub fn build_router(config: &WellnudgeConfig) -> Result<ProviderRouter> {
    let llm = &config.llm;
    for name in std::iter::once(&llm.provider).chain(llm.fallback_order.iter()) {
        if provider_registry::get_provider_config(name).is_none() {
            tracing::warn!("⚠️ Unknown LLM provider in config: {name}");
        }
    }

    let mut router = ProviderRouter::new(
        &llm.provider,
        llm.fallback_order.clone(),
        Duration::from_secs(llm.timeout_secs),
    );
    for name in provider_registry::all_provider_names() {
        router.register(create_provider(name, config)?);
    }

    let available = router.available();
    if available.is_empty() {
        tracing::warn!("⚠️ No LLM provider configured, template messages only");
    } else {
        tracing::info!("🧠 LLM providers available: {}", available.join(", "));
    }
    Ok(router)
}

/// List all available provider names.
pub fn available_providers() -> Vec<&'static str> {
    provider_registry::all_provider_names()
}
