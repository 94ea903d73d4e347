//! Follow-up questions about one analysed paper.
//!
//! The system prompt carries the structured analysis and the start of the
//! extracted text; each question is sent together with the conversation so
//! far and the reply is streamed back.

use crate::config::AiConfig;
use crate::error::{PaperError, Result};
use crate::model::Document;
use crate::prompts::chat_system_prompt;
use crate::providers::{self, AnalysisProvider, ChatTurn};
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

/// Paper text included in the chat system prompt, in characters.
pub const CHAT_EXCERPT_CHARS: usize = 30_000;

/// A conversation about one document.
pub struct ChatSession {
    provider: Arc<dyn AnalysisProvider>,
    system: String,
    history: Vec<ChatTurn>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("provider", &self.provider.name())
            .field("turns", &self.history.len())
            .finish()
    }
}

impl ChatSession {
    /// Start a conversation on `doc` with the active provider.
    pub fn new(doc: &Document, config: &AiConfig) -> Result<Self> {
        Ok(Self::with_provider(doc, providers::resolve(config)?))
    }

    pub fn with_provider(doc: &Document, provider: Arc<dyn AnalysisProvider>) -> Self {
        let excerpt = doc
            .extracted_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .map(|t| match t.char_indices().nth(CHAT_EXCERPT_CHARS) {
                Some((cut, _)) => &t[..cut],
                None => t,
            });
        Self {
            provider,
            system: chat_system_prompt(doc.display_title(), doc.analysis.as_ref(), excerpt),
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn system_prompt(&self) -> &str {
        &self.system
    }

    /// Ask a question; `on_chunk` sees each piece of the reply as it arrives.
    ///
    /// Both turns are added to the history only when the reply completes, so
    /// a failed request can simply be asked again.
    pub async fn ask_with<F>(&mut self, question: &str, mut on_chunk: F) -> Result<String>
    where
        F: FnMut(&str),
    {
        let mut turns = self.history.clone();
        turns.push(ChatTurn::user(question));

        let mut stream = self.provider.chat_stream(&self.system, &turns).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            on_chunk(&chunk);
            reply.push_str(&chunk);
        }
        if reply.trim().is_empty() {
            return Err(PaperError::EmptyResponse {
                provider: self.provider.name().to_string(),
            });
        }
        debug!("Chat reply: {} chars", reply.len());

        self.history.push(ChatTurn::user(question));
        self.history.push(ChatTurn::assistant(reply.clone()));
        Ok(reply)
    }

    /// Ask a question and return the full reply.
    pub async fn ask(&mut self, question: &str) -> Result<String> {
        self.ask_with(question, |_| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{tests::sample_analysis, Analysis, Language};
    use crate::providers::{ChatRole, TokenStream};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with fixed chunks and records what it was sent.
    struct ScriptedProvider {
        chunks: Vec<&'static str>,
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl AnalysisProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn analyze(&self, _text: &str, _language: Language) -> Result<Analysis> {
            Ok(sample_analysis())
        }

        async fn chat_stream(&self, _system: &str, history: &[ChatTurn]) -> Result<TokenStream> {
            self.seen.lock().unwrap().push(history.len());
            let items: Vec<Result<String>> =
                self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            Ok(Box::pin(futures::stream::iter(items)))
        }
    }

    fn completed_doc() -> Document {
        let mut doc = Document::new("attention.pdf");
        doc.analysis = Some(sample_analysis());
        doc.extracted_text = Some("x".repeat(CHAT_EXCERPT_CHARS + 10));
        doc
    }

    #[tokio::test]
    async fn reply_is_accumulated_and_recorded() {
        let provider = Arc::new(ScriptedProvider {
            chunks: vec!["Self-", "attention."],
            seen: Mutex::new(Vec::new()),
        });
        let mut chat = ChatSession::with_provider(&completed_doc(), provider.clone());

        let mut pieces = Vec::new();
        let reply = chat
            .ask_with("What is new?", |c| pieces.push(c.to_string()))
            .await
            .unwrap();
        assert_eq!(reply, "Self-attention.");
        assert_eq!(pieces.len(), 2);

        chat.ask("And the cost?").await.unwrap();
        assert_eq!(chat.history().len(), 4);
        assert_eq!(chat.history()[1].role, ChatRole::Assistant);
        assert_eq!(*provider.seen.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn empty_reply_leaves_history_untouched() {
        let provider = Arc::new(ScriptedProvider {
            chunks: vec![],
            seen: Mutex::new(Vec::new()),
        });
        let mut chat = ChatSession::with_provider(&completed_doc(), provider);
        let err = chat.ask("Hello?").await.unwrap_err();
        assert!(matches!(err, PaperError::EmptyResponse { .. }));
        assert!(chat.history().is_empty());
    }

    #[test]
    fn system_prompt_carries_analysis_and_capped_excerpt() {
        let provider = Arc::new(ScriptedProvider {
            chunks: vec![],
            seen: Mutex::new(Vec::new()),
        });
        let chat = ChatSession::with_provider(&completed_doc(), provider);
        let prompt = chat.system_prompt();
        assert!(prompt.contains("Attention Is All You Need"));
        assert!(prompt.contains("Quadratic memory."));
        assert!(!prompt.contains(&"x".repeat(CHAT_EXCERPT_CHARS + 1)));
        assert!(prompt.contains(&"x".repeat(CHAT_EXCERPT_CHARS)));
    }
}
