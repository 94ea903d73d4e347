//! LLM provider adapters.
//!
//! Two request dialects cover every supported vendor:
//!
//! * [`gemini::GeminiProvider`] — `generateContent` with a response schema the
//!   service enforces, plus Google Search grounding for URL analysis.
//! * [`openai::OpenAiCompatibleProvider`] — `/chat/completions` for OpenAI,
//!   SiliconFlow, MiniMax, Moonshot, Zhipu, DeepSeek and Qwen, where JSON is
//!   requested in the prompt and parsed out of the reply text.
//!
//! Both sit behind [`AnalysisProvider`], which is what the rest of the crate
//! depends on. There are no retries, no backoff and no fallback provider: a
//! failed call is reported to the caller once.

pub mod gemini;
pub mod openai;
pub mod schema;
pub mod sse;

use crate::config::{AiConfig, Provider};
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Language};
use crate::pipeline::postprocess::clean_json_response;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{error, warn};

pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;

/// Incrementally delivered reply text.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Speaker of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message of a chat conversation about a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A configured connection to one LLM vendor.
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Provider identifier for logs and error messages.
    fn name(&self) -> &str;

    /// Turn (already truncated) paper text into an [`Analysis`].
    async fn analyze(&self, text: &str, language: Language) -> Result<Analysis>;

    /// Stream an answer for the last user turn of `history`.
    async fn chat_stream(&self, system: &str, history: &[ChatTurn]) -> Result<TokenStream>;
}

/// Build the active provider from `config`.
///
/// Fails with [`PaperError::MissingApiKey`] before any network activity when
/// the active provider has no key.
pub fn resolve(config: &AiConfig) -> Result<Arc<dyn AnalysisProvider>> {
    let provider = config.active_provider;
    let key = config.require_key(provider)?;
    let base_url = config.base_url(provider);
    let model = config.active_model.as_str();

    Ok(match provider {
        Provider::Gemini => Arc::new(GeminiProvider::new(key, model, base_url)?),
        other => Arc::new(OpenAiCompatibleProvider::new(other, key, model, base_url)?),
    })
}

/// Shared HTTP client settings. No request timeout: provider calls run until
/// the vendor answers.
pub(crate) fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("paperlens/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PaperError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Read a non-success response into [`PaperError::ProviderHttp`].
pub(crate) async fn http_error(response: reqwest::Response) -> PaperError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    PaperError::ProviderHttp { status, body }
}

/// Clean and parse provider text into an [`Analysis`].
///
/// The raw text is logged on failure so a bad response can be diagnosed; it
/// is not repaired or retried.
pub(crate) fn parse_analysis(provider: &str, raw: &str) -> Result<Analysis> {
    let cleaned = clean_json_response(raw);
    if cleaned.is_empty() {
        return Err(PaperError::EmptyResponse {
            provider: provider.to_string(),
        });
    }

    let analysis: Analysis = serde_json::from_str(&cleaned).map_err(|e| {
        error!("{}: JSON parse error on content: {}", provider, cleaned);
        PaperError::MalformedResponse {
            provider: provider.to_string(),
            detail: e.to_string(),
        }
    })?;

    let empty = analysis.empty_sections();
    if !empty.is_empty() {
        warn!("{}: analysis has empty sections: {}", provider, empty.join(", "));
    }
    Ok(analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis_json() -> String {
        serde_json::to_string(&crate::model::tests::sample_analysis()).unwrap()
    }

    #[test]
    fn parses_fenced_json() {
        let raw = format!("```json\n{}\n```", analysis_json());
        let a = parse_analysis("openai", &raw).unwrap();
        assert_eq!(a.title, "Attention Is All You Need");
    }

    #[test]
    fn missing_field_is_malformed() {
        let raw = r#"{"title": "x", "authors": []}"#;
        let err = parse_analysis("deepseek", raw).unwrap_err();
        assert!(matches!(err, PaperError::MalformedResponse { .. }));
    }

    #[test]
    fn blank_text_is_empty_response() {
        let err = parse_analysis("qwen", "```json\n```").unwrap_err();
        assert!(matches!(err, PaperError::EmptyResponse { .. }));
    }

    #[test]
    fn resolve_requires_key() {
        let config = AiConfig::default();
        let err = resolve(&config).err().expect("missing key must fail");
        assert!(matches!(err, PaperError::MissingApiKey { .. }));
    }

    #[test]
    fn resolve_picks_dialect() {
        let config = AiConfig::builder()
            .provider(Provider::DeepSeek)
            .api_key(Provider::DeepSeek, "k")
            .build()
            .unwrap();
        assert_eq!(resolve(&config).unwrap().name(), "deepseek");

        let config = AiConfig::builder().api_key(Provider::Gemini, "k").build().unwrap();
        assert_eq!(resolve(&config).unwrap().name(), "gemini");
    }
}
