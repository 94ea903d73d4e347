//! Gemini `generateContent` adapter.
//!
//! Analysis requests carry the response schema, so the service itself
//! guarantees the JSON shape. URL analysis additionally uses the built-in
//! Google Search tool for the first, free-form step.

use super::schema::gemini_response_schema;
use super::sse::token_stream;
use super::{
    http_client, http_error, parse_analysis, AnalysisProvider, ChatRole, ChatTurn, TokenStream,
};
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Language};
use crate::prompts::analysis_system_prompt;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const PROVIDER: &str = "gemini";

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn texts(texts: impl IntoIterator<Item = String>) -> Self {
        Self {
            role: None,
            parts: texts.into_iter().map(|t| Part { text: Some(t) }).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect::<String>())
            .unwrap_or_default()
    }
}

fn parse_stream_chunk(payload: &str) -> std::result::Result<Option<String>, serde_json::Error> {
    let chunk: GenerateResponse = serde_json::from_str(payload)?;
    let text = chunk.text();
    Ok((!text.is_empty()).then_some(text))
}

// ── Provider ─────────────────────────────────────────────────────────────

/// Schema-enforced Gemini provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/v1beta/models/{}:{}", self.base_url, self.model, method)
    }

    async fn send(&self, method: &str, body: &GenerateRequest) -> Result<reqwest::Response> {
        let url = self.endpoint(method);
        debug!("gemini: POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| PaperError::Http {
                provider: PROVIDER.to_string(),
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        Ok(response)
    }

    async fn generate(&self, body: &GenerateRequest) -> Result<String> {
        let response = self.send("generateContent", body).await?;
        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| PaperError::MalformedResponse {
                provider: PROVIDER.to_string(),
                detail: e.to_string(),
            })?;
        Ok(parsed.text())
    }

    /// Schema-constrained call whose parts are sent as one user turn.
    pub async fn generate_structured(&self, parts: Vec<String>) -> Result<Analysis> {
        let body = GenerateRequest {
            contents: vec![Content::texts(parts)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: "application/json",
                response_schema: gemini_response_schema(),
            }),
            tools: Vec::new(),
        };
        let text = self.generate(&body).await?;
        if text.trim().is_empty() {
            return Err(PaperError::EmptyResponse {
                provider: PROVIDER.to_string(),
            });
        }
        parse_analysis(PROVIDER, &text)
    }

    /// Free-form call with Google Search grounding enabled.
    pub async fn grounded_search(&self, prompt: String) -> Result<String> {
        let body = GenerateRequest {
            contents: vec![Content::texts([prompt])],
            system_instruction: None,
            generation_config: None,
            tools: vec![serde_json::json!({ "google_search": {} })],
        };
        self.generate(&body).await
    }
}

#[async_trait]
impl AnalysisProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn analyze(&self, text: &str, language: Language) -> Result<Analysis> {
        self.generate_structured(vec![analysis_system_prompt(language), text.to_string()])
            .await
    }

    async fn chat_stream(&self, system: &str, history: &[ChatTurn]) -> Result<TokenStream> {
        let contents = history
            .iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        ChatRole::User => "user",
                        ChatRole::Assistant => "model",
                    }
                    .to_string(),
                ),
                parts: vec![Part {
                    text: Some(turn.content.clone()),
                }],
            })
            .collect();
        let body = GenerateRequest {
            contents,
            system_instruction: Some(Content::texts([system.to_string()])),
            generation_config: None,
            tools: Vec::new(),
        };
        let response = self.send("streamGenerateContent?alt=sse", &body).await?;
        Ok(token_stream(response, PROVIDER, parse_stream_chunk))
    }
}
