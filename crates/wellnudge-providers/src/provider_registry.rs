//! Provider registry: maps provider names to endpoint configurations.
//!
//! Every supported backend speaks the OpenAI chat-completions dialect, so the
//! unified `OpenAiCompatibleProvider` uses these entries to reach any of them.

/// Configuration for a single provider.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub name: &'static str,
    /// Base URL for the API.
    pub base_url: &'static str,
    /// Path for chat completions endpoint (appended to base_url).
    pub chat_path: &'static str,
    /// Environment variable names to try for the API key (in order).
    pub env_keys: &'static [&'static str],
    /// Model used when the caller does not pick one.
    pub default_model: &'static str,
}

// ─── Provider Definitions ────────────────────────────────────────────────────

static PROVIDERS: &[ProviderConfig] = &[
    ProviderConfig {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        chat_path: "/chat/completions",
        env_keys: &["OPENAI_API_KEY"],
        default_model: "gpt-4o-mini",
    },
    ProviderConfig {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        chat_path: "/chat/completions",
        env_keys: &["DEEPSEEK_API_KEY"],
        default_model: "deepseek-chat",
    },
    ProviderConfig {
        name: "tongyi",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        chat_path: "/chat/completions",
        env_keys: &["DASHSCOPE_API_KEY", "TONGYI_API_KEY"],
        default_model: "qwen-turbo",
    },
];

/// Look up a provider configuration by name (case-insensitive).
pub fn get_provider_config(name: &str) -> Option<&'static ProviderConfig> {
    let lower = name.to_ascii_lowercase();
    PROVIDERS.iter().find(|p| p.name == lower)
}

/// Names of all registered providers, in registry order.
pub fn all_provider_names() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let cfg = get_provider_config("DeepSeek").unwrap();
        assert_eq!(cfg.default_model, "deepseek-chat");
        assert!(get_provider_config("nope").is_none());
    }

    #[test]
    fn test_names() {
        assert_eq!(all_provider_names(), vec!["openai", "deepseek", "tongyi"]);
    }
}
