//! OpenAI-compatible `/chat/completions` adapter.
//!
//! Used for every provider except Gemini. JSON output is requested through the
//! system prompt and, where the model supports it, `response_format`.

use super::sse::token_stream;
use super::{
    http_client, http_error, parse_analysis, AnalysisProvider, ChatRole, ChatTurn, TokenStream,
};
use crate::config::Provider;
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Language};
use crate::prompts::{analysis_system_prompt, STRICT_JSON_SUFFIX};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sampling temperature for analysis requests.
pub const ANALYSIS_TEMPERATURE: f32 = 0.2;

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

fn parse_stream_chunk(payload: &str) -> std::result::Result<Option<String>, serde_json::Error> {
    let chunk: StreamChunk = serde_json::from_str(payload)?;
    Ok(chunk.choices.into_iter().next().and_then(|c| c.delta.content))
}

/// Whether the model accepts `response_format: json_object`.
///
/// Reasoning models reject it and rely on the prompt alone.
pub fn supports_json_mode(model: &str) -> bool {
    !(model.contains("reasoner") || model.contains("o1") || model.contains("R1"))
}

// ── Provider ─────────────────────────────────────────────────────────────

/// Provider speaking the OpenAI chat-completions dialect.
pub struct OpenAiCompatibleProvider {
    provider: Provider,
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        provider: Provider,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            provider,
            client: http_client()?,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, request: &ChatCompletionRequest<'_>) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!("{}: POST {} (model {})", self.provider, url, self.model);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| PaperError::Http {
                provider: self.provider.id().to_string(),
                detail: e.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(http_error(response).await);
        }
        Ok(response)
    }
}

#[async_trait]
impl AnalysisProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.provider.id()
    }

    async fn analyze(&self, text: &str, language: Language) -> Result<Analysis> {
        let system = format!("{}{}", analysis_system_prompt(language), STRICT_JSON_SUFFIX);
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage::new("system", system), ChatMessage::new("user", text)],
            temperature: Some(ANALYSIS_TEMPERATURE),
            response_format: supports_json_mode(&self.model)
                .then_some(ResponseFormat { kind: "json_object" }),
            stream: false,
        };

        let response = self.post(&request).await?;
        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PaperError::MalformedResponse {
                provider: self.name().to_string(),
                detail: e.to_string(),
            })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| PaperError::EmptyResponse {
                provider: self.name().to_string(),
            })?;

        parse_analysis(self.name(), &content)
    }

    async fn chat_stream(&self, system: &str, history: &[ChatTurn]) -> Result<TokenStream> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(ChatMessage::new("system", system));
        for turn in history {
            let role = match turn.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
            };
            messages.push(ChatMessage::new(role, turn.content.as_str()));
        }
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            temperature: None,
            response_format: None,
            stream: true,
        };
        let response = self.post(&request).await?;
        Ok(token_stream(response, self.name(), parse_stream_chunk))
    }
}
