//! Provider and cloud configuration.
//!
//! [`AiConfig`] selects the active LLM provider and model and carries one API
//! key and one optional base-URL override per provider. [`CloudConfig`]
//! points at the hosted backend used for mirroring. Both are plain data: the
//! store persists them and the CLI edits them; nothing here performs I/O
//! except [`AiConfig::apply_env_keys`].

use crate::error::{PaperError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Character ceiling for providers advertising long context windows.
pub const LONG_CONTEXT_MAX_CHARS: usize = 500_000;

/// Character ceiling for every other provider.
pub const DEFAULT_MAX_CHARS: usize = 100_000;

/// External LLM vendors the analysis adapter can talk to.
///
/// Only [`Provider::Gemini`] enforces a response schema server-side; the
/// others speak the OpenAI `/chat/completions` dialect and are asked for JSON
/// in the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "siliconflow")]
    SiliconFlow,
    #[serde(rename = "minimax")]
    MiniMax,
    Moonshot,
    Zhipu,
    #[serde(rename = "deepseek")]
    DeepSeek,
    Qwen,
}

/// A model offered in the provider catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub id: &'static str,
    pub name: &'static str,
}

impl Provider {
    pub const ALL: [Provider; 8] = [
        Provider::Gemini,
        Provider::OpenAi,
        Provider::SiliconFlow,
        Provider::MiniMax,
        Provider::Moonshot,
        Provider::Zhipu,
        Provider::DeepSeek,
        Provider::Qwen,
    ];

    /// Lowercase identifier used in config files and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::SiliconFlow => "siliconflow",
            Provider::MiniMax => "minimax",
            Provider::Moonshot => "moonshot",
            Provider::Zhipu => "zhipu",
            Provider::DeepSeek => "deepseek",
            Provider::Qwen => "qwen",
        }
    }

    /// Environment variable consulted when no key is stored.
    pub fn key_env_var(self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::SiliconFlow => "SILICONFLOW_API_KEY",
            Provider::MiniMax => "MINIMAX_API_KEY",
            Provider::Moonshot => "MOONSHOT_API_KEY",
            Provider::Zhipu => "ZHIPU_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Qwen => "QWEN_API_KEY",
        }
    }

    /// Whether the provider enforces a JSON schema on its output.
    pub fn is_schema_enforced(self) -> bool {
        matches!(self, Provider::Gemini)
    }

    /// Maximum characters of document text sent in one request.
    pub fn max_chars(self) -> usize {
        match self {
            Provider::Gemini | Provider::SiliconFlow => LONG_CONTEXT_MAX_CHARS,
            _ => DEFAULT_MAX_CHARS,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Gemini => "https://generativelanguage.googleapis.com",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::SiliconFlow => "https://api.siliconflow.cn/v1",
            Provider::MiniMax => "https://api.minimax.io/v1",
            Provider::Moonshot => "https://api.moonshot.cn/v1",
            Provider::Zhipu => "https://open.bigmodel.cn/api/paas/v4",
            Provider::DeepSeek => "https://api.deepseek.com/v1",
            Provider::Qwen => "https://dashscope.aliyuncs.com/compatible-mode/v1",
        }
    }

    /// Known models, best first.
    pub fn models(self) -> &'static [ModelInfo] {
        match self {
            Provider::Gemini => &[
                ModelInfo { id: "gemini-3-pro-preview", name: "Gemini 3.0 Pro Preview" },
                ModelInfo { id: "gemini-2.5-flash", name: "Gemini 2.5 Flash" },
                ModelInfo { id: "gemini-2.0-pro-exp-02-05", name: "Gemini 2.0 Pro Exp" },
                ModelInfo {
                    id: "gemini-2.0-flash-thinking-exp-01-21",
                    name: "Gemini 2.0 Flash Thinking",
                },
            ],
            Provider::OpenAi => &[
                ModelInfo { id: "o1", name: "GPT o1 (Reasoning)" },
                ModelInfo { id: "o3-mini", name: "GPT o3 Mini" },
                ModelInfo { id: "gpt-4o", name: "GPT-4o" },
                ModelInfo { id: "gpt-4o-mini", name: "GPT-4o Mini" },
            ],
            Provider::SiliconFlow => &[
                ModelInfo { id: "deepseek-ai/DeepSeek-R1", name: "DeepSeek R1 (SiliconFlow)" },
                ModelInfo { id: "deepseek-ai/DeepSeek-V3", name: "DeepSeek V3 (SiliconFlow)" },
                ModelInfo { id: "Qwen/Qwen2.5-72B-Instruct", name: "Qwen 2.5 72B" },
                ModelInfo { id: "THUDM/glm-4-9b-chat", name: "GLM-4 9B" },
            ],
            Provider::MiniMax => &[
                ModelInfo { id: "MiniMax-M2", name: "MiniMax M2" },
                ModelInfo { id: "MiniMax-M2-Stable", name: "MiniMax M2 Stable" },
                ModelInfo { id: "abab6.5s-chat", name: "Abab 6.5s" },
                ModelInfo { id: "abab6.5g-chat", name: "Abab 6.5g" },
            ],
            Provider::Moonshot => &[
                ModelInfo { id: "kimi-latest", name: "Kimi Latest" },
                ModelInfo { id: "kimi-k2-thinking", name: "Kimi K2 Thinking" },
                ModelInfo { id: "moonshot-v1-128k", name: "Moonshot V1 128k" },
                ModelInfo { id: "moonshot-v1-32k", name: "Moonshot V1 32k" },
            ],
            Provider::Zhipu => &[
                ModelInfo { id: "glm-4.6", name: "GLM-4.6" },
                ModelInfo { id: "glm-4-plus", name: "GLM-4 Plus" },
                ModelInfo { id: "glm-4-flash", name: "GLM-4 Flash" },
                ModelInfo { id: "glm-4-air", name: "GLM-4 Air" },
            ],
            Provider::DeepSeek => &[
                ModelInfo { id: "deepseek-reasoner", name: "DeepSeek R1 (Reasoner)" },
                ModelInfo { id: "deepseek-chat", name: "DeepSeek V3 (Chat)" },
                ModelInfo { id: "deepseek-coder", name: "DeepSeek Coder V2" },
            ],
            Provider::Qwen => &[
                ModelInfo { id: "qwen3-max", name: "Qwen3 Max" },
                ModelInfo { id: "qwen-plus", name: "Qwen Plus" },
                ModelInfo { id: "qwen-flash", name: "Qwen Flash" },
                ModelInfo { id: "qwen3-coder-plus", name: "Qwen3 Coder Plus" },
            ],
        }
    }

    pub fn default_model(self) -> &'static str {
        self.models()[0].id
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Provider {
    type Err = PaperError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == wanted)
            .ok_or_else(|| PaperError::UnsupportedProvider(s.to_string()))
    }
}

// ── AiConfig ─────────────────────────────────────────────────────────────

/// Active provider/model plus per-provider credentials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub active_provider: Provider,
    pub active_model: String,
    #[serde(default)]
    pub keys: BTreeMap<Provider, String>,
    #[serde(default)]
    pub base_urls: BTreeMap<Provider, String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            active_provider: Provider::Gemini,
            active_model: Provider::Gemini.default_model().to_string(),
            keys: Provider::ALL.iter().map(|p| (*p, String::new())).collect(),
            base_urls: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let configured: Vec<&str> = self
            .keys
            .iter()
            .filter(|(_, k)| !k.is_empty())
            .map(|(p, _)| p.id())
            .collect();
        f.debug_struct("AiConfig")
            .field("active_provider", &self.active_provider)
            .field("active_model", &self.active_model)
            .field("keys", &configured)
            .field("base_urls", &self.base_urls)
            .finish()
    }
}

impl AiConfig {
    /// Create a new builder starting from the defaults.
    pub fn builder() -> AiConfigBuilder {
        AiConfigBuilder {
            config: Self::default(),
        }
    }

    /// Stored key for `provider`, `None` when empty.
    pub fn key(&self, provider: Provider) -> Option<&str> {
        self.keys
            .get(&provider)
            .map(String::as_str)
            .filter(|k| !k.trim().is_empty())
    }

    /// Key for the active provider, or the error the UI turns into a settings prompt.
    pub fn require_active_key(&self) -> Result<&str> {
        self.require_key(self.active_provider)
    }

    pub fn require_key(&self, provider: Provider) -> Result<&str> {
        self.key(provider).ok_or_else(|| PaperError::MissingApiKey {
            provider: provider.id().to_uppercase(),
            hint: format!(
                "Configure it with `paperlens config set-key {} <KEY>` or set {}.",
                provider.id(),
                provider.key_env_var()
            ),
        })
    }

    /// Base URL for `provider`: the override when set, the vendor default otherwise.
    pub fn base_url(&self, provider: Provider) -> String {
        self.base_urls
            .get(&provider)
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    /// Fill empty keys from the providers' environment variables.
    pub fn apply_env_keys(&mut self) {
        for provider in Provider::ALL {
            if self.key(provider).is_some() {
                continue;
            }
            if let Ok(v) = std::env::var(provider.key_env_var()) {
                if !v.trim().is_empty() {
                    self.keys.insert(provider, v);
                }
            }
        }
    }

    /// Make sure every known provider has a (possibly empty) key slot.
    pub fn ensure_key_slots(&mut self) {
        for provider in Provider::ALL {
            self.keys.entry(provider).or_default();
        }
    }
}

/// Builder for [`AiConfig`].
#[derive(Debug)]
pub struct AiConfigBuilder {
    config: AiConfig,
}

impl AiConfigBuilder {
    /// Switch provider; the model resets to the provider's default.
    pub fn provider(mut self, provider: Provider) -> Self {
        self.config.active_provider = provider;
        self.config.active_model = provider.default_model().to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.active_model = model.into();
        self
    }

    pub fn api_key(mut self, provider: Provider, key: impl Into<String>) -> Self {
        self.config.keys.insert(provider, key.into());
        self
    }

    pub fn base_url(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.config.base_urls.insert(provider, url.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AiConfig> {
        if self.config.active_model.trim().is_empty() {
            return Err(PaperError::InvalidConfig("model id must not be empty".into()));
        }
        for (provider, url) in &self.config.base_urls {
            let url = url.trim();
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PaperError::InvalidConfig(format!(
                    "base URL for {provider} must start with http:// or https://, got '{url}'"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── CloudConfig ──────────────────────────────────────────────────────────

/// Connection settings for the hosted backend mirror.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<chrono::DateTime<chrono::Utc>>,
}

impl fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudConfig")
            .field("url", &self.url)
            .field("anon_key", &if self.anon_key.is_empty() { "" } else { "<set>" })
            .field("enabled", &self.enabled)
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

impl CloudConfig {
    /// Mirroring happens only when enabled and fully configured.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    /// URL without trailing slash; a bare host gets `https://`.
    pub fn normalized_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("https://{url}")
        }
    }

    /// Whether switching to `other` needs a new client session.
    pub fn endpoint_changed(&self, other: &CloudConfig) -> bool {
        self.url != other.url || self.anon_key != other.anon_key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_gemini() {
        let c = AiConfig::default();
        assert_eq!(c.active_provider, Provider::Gemini);
        assert_eq!(c.active_model, "gemini-3-pro-preview");
        assert_eq!(c.keys.len(), Provider::ALL.len());
        assert!(c.require_active_key().is_err());
    }

    #[test]
    fn provider_round_trips_through_str() {
        for p in Provider::ALL {
            assert_eq!(p.id().parse::<Provider>().unwrap(), p);
        }
        assert!("anthropic".parse::<Provider>().is_err());
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
    }

    #[test]
    fn every_provider_has_a_catalogue() {
        for p in Provider::ALL {
            let models = p.models();
            assert!(!models.is_empty(), "{p} has no models");
            assert_eq!(p.default_model(), models[0].id);
        }
        assert_eq!(Provider::DeepSeek.default_model(), "deepseek-reasoner");
    }

    #[test]
    fn long_context_ceiling() {
        assert_eq!(Provider::Gemini.max_chars(), 500_000);
        assert_eq!(Provider::SiliconFlow.max_chars(), 500_000);
        assert_eq!(Provider::OpenAi.max_chars(), 100_000);
        assert_eq!(Provider::DeepSeek.max_chars(), 100_000);
    }

    #[test]
    fn base_url_override_wins_and_is_trimmed() {
        let c = AiConfig::builder()
            .provider(Provider::OpenAi)
            .base_url(Provider::OpenAi, "http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(c.base_url(Provider::OpenAi), "http://localhost:8080/v1");
        assert_eq!(c.base_url(Provider::Qwen), Provider::Qwen.default_base_url());
    }

    #[test]
    fn builder_rejects_bad_base_url() {
        let r = AiConfig::builder()
            .base_url(Provider::OpenAi, "localhost:8080")
            .build();
        assert!(matches!(r, Err(PaperError::InvalidConfig(_))));
    }

    #[test]
    fn blank_key_counts_as_missing() {
        let c = AiConfig::builder().api_key(Provider::Gemini, "   ").build().unwrap();
        let err = c.require_active_key().unwrap_err();
        assert!(matches!(err, PaperError::MissingApiKey { .. }));
    }

    #[test]
    fn debug_hides_keys() {
        let c = AiConfig::builder().api_key(Provider::Gemini, "secret-123").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("secret-123"));
        assert!(dbg.contains("gemini"));
    }

    #[test]
    fn serialises_with_provider_ids() {
        let c = AiConfig::builder()
            .provider(Provider::SiliconFlow)
            .api_key(Provider::SiliconFlow, "k")
            .build()
            .unwrap();
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["activeProvider"], "siliconflow");
        assert_eq!(v["keys"]["siliconflow"], "k");
    }

    #[test]
    fn cloud_activity_requires_all_fields() {
        let mut c = CloudConfig {
            url: "abc.supabase.co".into(),
            anon_key: "anon".into(),
            enabled: false,
            last_sync: None,
        };
        assert!(!c.is_active());
        c.enabled = true;
        assert!(c.is_active());
        assert_eq!(c.normalized_url(), "https://abc.supabase.co");
    }
}
