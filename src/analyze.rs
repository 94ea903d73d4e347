//! Analysis entry points: paper text or paper URL in, [`Analysis`] out.
//!
//! Both functions check credentials before touching the network, so a
//! missing key never costs a request.

use crate::config::{AiConfig, Provider};
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Language};
use crate::prompts::{search_context, url_formatting_prompt, url_search_prompt, TRUNCATION_MARKER};
use crate::providers::{self, GeminiProvider};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use tracing::{info, warn};

/// Model used for both steps of URL analysis.
pub const URL_ANALYSIS_MODEL: &str = "gemini-2.5-flash";

static RE_ARXIV: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"arxiv\.org/(?:pdf|abs)/([\d.]+)").expect("valid arxiv regex"));

/// Cut `text` at the provider's character ceiling and mark the cut.
///
/// The ceiling counts characters, not bytes, so multi-byte text is never
/// split inside a code point.
pub fn truncate_for_provider(text: &str, provider: Provider) -> Cow<'_, str> {
    truncate_chars(text, provider.max_chars())
}

fn truncate_chars(text: &str, max_chars: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max_chars) {
        None => Cow::Borrowed(text),
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&text[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            Cow::Owned(cut)
        }
    }
}

/// arXiv identifier of a `arxiv.org/pdf/<id>` or `arxiv.org/abs/<id>` URL.
pub fn arxiv_id(url: &str) -> Option<&str> {
    RE_ARXIV
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.'))
        .filter(|id| !id.is_empty())
}

/// Analyse extracted paper text with the active provider.
pub async fn analyze_text(text: &str, config: &AiConfig, language: Language) -> Result<Analysis> {
    let provider = providers::resolve(config)?;
    let input = truncate_for_provider(text, config.active_provider);
    if matches!(input, Cow::Owned(_)) {
        warn!(
            "Text truncated to {} characters for {}",
            config.active_provider.max_chars(),
            provider.name()
        );
    }
    info!(
        "Analysing {} characters with {} ({})",
        input.chars().count(),
        provider.name(),
        config.active_model
    );
    provider.analyze(&input, language).await
}

/// The Gemini key URL analysis runs on, whatever the active provider is.
pub fn require_url_key(config: &AiConfig) -> Result<&str> {
    config.key(Provider::Gemini).ok_or_else(|| PaperError::MissingApiKey {
        provider: Provider::Gemini.id().to_uppercase(),
        hint: format!(
            "URL analysis uses Google Search grounding and needs a Gemini key. Configure it with `paperlens config set-key gemini <KEY>` or set {}.",
            Provider::Gemini.key_env_var()
        ),
    })
}

/// Analyse a paper from its URL using search grounding.
///
/// Always runs on Gemini regardless of the active provider: the first call
/// gathers a grounded summary, the second coerces it into the schema.
pub async fn analyze_url(url: &str, config: &AiConfig, language: Language) -> Result<Analysis> {
    let key = require_url_key(config)?;

    let gemini = GeminiProvider::new(key, URL_ANALYSIS_MODEL, config.base_url(Provider::Gemini))?;
    let context = search_context(url, arxiv_id(url));

    info!("Searching for paper at {}", url);
    let summary = gemini.grounded_search(url_search_prompt(&context, language)).await?;
    if summary.trim().is_empty() {
        return Err(PaperError::SearchReturnedNothing { url: url.to_string() });
    }

    info!("Formatting search summary ({} chars)", summary.len());
    gemini
        .generate_structured(vec![url_formatting_prompt(&summary)])
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_borrowed() {
        let out = truncate_chars("abc", 3);
        assert!(matches!(out, Cow::Borrowed("abc")));
    }

    #[test]
    fn long_text_cut_and_marked() {
        let out = truncate_chars("abcdef", 4);
        assert_eq!(out, "abcd...(truncated)");
    }

    #[test]
    fn cut_counts_chars_not_bytes() {
        let out = truncate_chars("注意力机制", 2);
        assert_eq!(out, "注意...(truncated)");
    }

    #[test]
    fn ceilings_per_provider() {
        let text = "x".repeat(100_001);
        assert!(matches!(truncate_for_provider(&text, Provider::Gemini), Cow::Borrowed(_)));
        assert!(matches!(truncate_for_provider(&text, Provider::SiliconFlow), Cow::Borrowed(_)));
        let cut = truncate_for_provider(&text, Provider::OpenAi);
        assert_eq!(cut.chars().count(), 100_000 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn arxiv_ids() {
        assert_eq!(arxiv_id("https://arxiv.org/abs/1706.03762"), Some("1706.03762"));
        assert_eq!(arxiv_id("https://arxiv.org/pdf/1706.03762v5"), Some("1706.03762"));
        assert_eq!(arxiv_id("https://arxiv.org/pdf/2401.00001.pdf"), Some("2401.00001"));
        assert_eq!(arxiv_id("https://example.com/paper.pdf"), None);
    }

    #[tokio::test]
    async fn url_analysis_needs_gemini_key() {
        let config = AiConfig::builder()
            .provider(Provider::OpenAi)
            .api_key(Provider::OpenAi, "sk-test")
            .build()
            .unwrap();
        let err = analyze_url("https://arxiv.org/abs/1706.03762", &config, Language::En)
            .await
            .unwrap_err();
        match err {
            PaperError::MissingApiKey { provider, hint } => {
                assert_eq!(provider, "GEMINI");
                assert!(hint.contains("Google Search"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
