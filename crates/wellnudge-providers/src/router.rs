//! Provider router: primary provider plus an ordered fallback chain.
//!
//! Every provider outcome is flattened to text at this boundary. Failures
//! become strings starting with [`ERROR_MARKER`], so callers branch on a value
//! instead of on error types.

use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;
use wellnudge_core::error::WellnudgeError;
use wellnudge_core::traits::provider::{GenerateParams, LlmProvider};
use wellnudge_core::types::ChatMessage;

/// Prefix of every failure string.
pub const ERROR_MARKER: &str = "Error:";
pub const ALL_FAILED: &str = "Error: All LLM providers failed";
pub const NONE_AVAILABLE: &str = "Error: No LLM provider available";

/// Whether a router reply signals failure.
pub fn is_error(text: &str) -> bool {
    text.starts_with(ERROR_MARKER)
}

/// Per-provider call statistics (reporting only, never used to skip).
struct ProviderSlot {
    provider: Box<dyn LlmProvider>,
    successes: AtomicU32,
    failures: AtomicU32,
    /// Unix secs of the last failure, 0 = never.
    last_failure: AtomicU64,
}

impl ProviderSlot {
    fn new(provider: Box<dyn LlmProvider>) -> Self {
        Self {
            provider,
            successes: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
        }
    }

    fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_failure.store(now, Ordering::Relaxed);
    }

    /// Call the provider, converting errors, timeouts and panics into marker text.
    async fn call(
        &self,
        messages: &[ChatMessage],
        params: &GenerateParams,
        timeout: Duration,
    ) -> String {
        let name = self.provider.name();
        let fut = AssertUnwindSafe(self.provider.chat(messages, params)).catch_unwind();
        let text = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(Ok(text))) => text,
            Ok(Ok(Err(WellnudgeError::ApiKeyMissing(_)))) => {
                format!("{ERROR_MARKER} {name} API key not configured")
            }
            Ok(Ok(Err(e))) => format!("{ERROR_MARKER} {e}"),
            Ok(Err(_)) => format!("{ERROR_MARKER} {name} panicked during chat"),
            Err(_) => format!("{ERROR_MARKER} {name} timed out after {}s", timeout.as_secs()),
        };
        if is_error(&text) {
            self.record_failure();
        } else {
            self.record_success();
        }
        text
    }
}

/// Snapshot of one provider's state, for the `providers` command and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderHealth {
    pub name: String,
    pub configured: bool,
    pub successes: u32,
    pub failures: u32,
    pub last_failure: u64,
}

/// Routes chat calls to the primary provider and fails over in order.
pub struct ProviderRouter {
    primary: String,
    fallback_order: Vec<String>,
    slots: HashMap<String, ProviderSlot>,
    call_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(primary: &str, fallback_order: Vec<String>, call_timeout: Duration) -> Self {
        Self {
            primary: primary.to_ascii_lowercase(),
            fallback_order: fallback_order
                .into_iter()
                .map(|n| n.to_ascii_lowercase())
                .collect(),
            slots: HashMap::new(),
            call_timeout,
        }
    }

    /// Register a provider under its own name. Replaces any previous entry.
    pub fn register(&mut self, provider: Box<dyn LlmProvider>) {
        let name = provider.name().to_ascii_lowercase();
        self.slots.insert(name, ProviderSlot::new(provider));
    }

    pub fn with_provider(mut self, provider: Box<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn primary(&self) -> &str {
        &self.primary
    }

    /// Configured providers, primary first then fallback order.
    pub fn available(&self) -> Vec<&str> {
        let mut names = vec![self.primary.as_str()];
        names.extend(self.fallback_order.iter().map(String::as_str));
        let mut seen = Vec::new();
        for name in names {
            if !seen.contains(&name) && self.configured(name).is_some() {
                seen.push(name);
            }
        }
        seen
    }

    pub fn health_status(&self) -> Vec<ProviderHealth> {
        let mut out: Vec<ProviderHealth> = self
            .slots
            .iter()
            .map(|(name, s)| ProviderHealth {
                name: name.clone(),
                configured: s.provider.is_configured(),
                successes: s.successes.load(Ordering::Relaxed),
                failures: s.failures.load(Ordering::Relaxed),
                last_failure: s.last_failure.load(Ordering::Relaxed),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn configured(&self, name: &str) -> Option<&ProviderSlot> {
        self.slots.get(name).filter(|s| s.provider.is_configured())
    }

    /// Run a chat completion. Never fails: errors come back as marker text.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        params: &GenerateParams,
        use_fallback: bool,
    ) -> String {
        match self.configured(&self.primary) {
            Some(slot) => {
                let reply = slot.call(messages, params, self.call_timeout).await;
                if !is_error(&reply) {
                    return reply;
                }
                tracing::warn!("⚠️ Primary provider {} failed: {}", self.primary, reply);
                if !use_fallback {
                    return reply;
                }
            }
            None => {
                tracing::warn!(
                    "⚠️ Primary provider {} not available, trying fallbacks",
                    self.primary
                );
                if !use_fallback || self.available().is_empty() {
                    return NONE_AVAILABLE.to_string();
                }
            }
        }

        for name in &self.fallback_order {
            if *name == self.primary {
                continue;
            }
            let Some(slot) = self.configured(name) else {
                continue;
            };
            tracing::info!("🔄 Trying fallback provider: {name}");
            let reply = slot.call(messages, params, self.call_timeout).await;
            if !is_error(&reply) {
                tracing::info!("🔄 Failover: {} → {} (success)", self.primary, name);
                return reply;
            }
            tracing::warn!("⚠️ Fallback provider {name} failed: {reply}");
        }

        ALL_FAILED.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use wellnudge_core::error::Result;

    /// Scripted provider for router and generator tests.
    pub struct MockProvider {
        pub name: String,
        pub configured: bool,
        pub reply: std::result::Result<String, String>,
        pub calls: AtomicU32,
    }

    impl MockProvider {
        pub fn ok(name: &str, reply: &str) -> Self {
            Self {
                name: name.into(),
                configured: true,
                reply: Ok(reply.into()),
                calls: AtomicU32::new(0),
            }
        }

        pub fn failing(name: &str) -> Self {
            Self {
                name: name.into(),
                configured: true,
                reply: Err(format!("{name} is down")),
                calls: AtomicU32::new(0),
            }
        }

        pub fn unconfigured(name: &str) -> Self {
            Self {
                configured: false,
                ..Self::ok(name, "should not be called")
            }
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn chat(&self, _messages: &[ChatMessage], _params: &GenerateParams) -> Result<String> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.reply.clone().map_err(WellnudgeError::Provider)
        }
    }

    struct PanickingProvider;

    #[async_trait]
    impl LlmProvider for PanickingProvider {
        fn name(&self) -> &str {
            "openai"
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn chat(&self, _m: &[ChatMessage], _p: &GenerateParams) -> Result<String> {
            panic!("library fault")
        }
    }

    fn order() -> Vec<String> {
        vec!["openai".into(), "deepseek".into(), "tongyi".into()]
    }

    fn msgs() -> Vec<ChatMessage> {
        vec![ChatMessage::user("hello")]
    }

    #[tokio::test]
    async fn test_fallback_to_secondary() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(MockProvider::failing("openai")))
            .with_provider(Box::new(MockProvider::ok("deepseek", "stand up")));
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, "stand up");

        let health = router.health_status();
        assert_eq!(health[0].name, "deepseek");
        assert_eq!(health[0].successes, 1);
        assert_eq!(health[1].failures, 1);
    }

    #[tokio::test]
    async fn test_no_fallback_returns_primary_error() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(MockProvider::failing("openai")))
            .with_provider(Box::new(MockProvider::ok("deepseek", "stand up")));
        let reply = router.chat(&msgs(), &GenerateParams::default(), false).await;
        assert!(is_error(&reply));
        assert!(reply.contains("openai is down"));
    }

    #[tokio::test]
    async fn test_all_failed() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(MockProvider::failing("openai")))
            .with_provider(Box::new(MockProvider::failing("tongyi")));
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, ALL_FAILED);
    }

    #[tokio::test]
    async fn test_unconfigured_primary_skipped() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(MockProvider::unconfigured("openai")))
            .with_provider(Box::new(MockProvider::ok("tongyi", "drink water")));
        assert_eq!(router.available(), vec!["tongyi"]);
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, "drink water");

        let reply = router.chat(&msgs(), &GenerateParams::default(), false).await;
        assert_eq!(reply, NONE_AVAILABLE);
    }

    #[tokio::test]
    async fn test_no_providers() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5));
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, NONE_AVAILABLE);
    }

    #[tokio::test]
    async fn test_error_marked_text_triggers_failover() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(MockProvider::ok("openai", "Error: quota exceeded")))
            .with_provider(Box::new(MockProvider::ok("deepseek", "take a walk")));
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, "take a walk");
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let router = ProviderRouter::new("openai", order(), Duration::from_secs(5))
            .with_provider(Box::new(PanickingProvider))
            .with_provider(Box::new(MockProvider::ok("deepseek", "ok")));
        let reply = router.chat(&msgs(), &GenerateParams::default(), true).await;
        assert_eq!(reply, "ok");
    }
}
