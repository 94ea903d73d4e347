//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use paperlens::{Result, TextExtractor};
use serde_json::{json, Value};

/// A complete analysis object as a provider would return it.
pub fn analysis_json() -> Value {
    json!({
        "title": "Attention Is All You Need",
        "authors": ["Ashish Vaswani", "Noam Shazeer"],
        "background": "Sequence transduction relied on recurrence.",
        "motivation": "Recurrence prevents parallel training.",
        "research_conclusion": "Self-attention alone reaches state of the art.",
        "methodology_math": "$\\mathrm{softmax}(QK^T/\\sqrt{d_k})V$",
        "implementation_details": "8 P100 GPUs, 3.5 days.",
        "evaluation_results": "28.4 BLEU on WMT14 EN-DE.",
        "reviewer_critique": "Quadratic memory in sequence length.",
        "one_more_thing": "Sinusoidal positional encodings.",
        "suggested_tags": ["NLP", "Transformer"]
    })
}

/// `generateContent` reply whose single part carries `text`.
pub fn gemini_reply(text: &str) -> Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

/// `chat/completions` reply whose message carries `content`.
pub fn openai_reply(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

/// Smallest byte string the ingest pipeline accepts as a PDF.
pub fn pdf_bytes() -> Vec<u8> {
    b"%PDF-1.7\n% test fixture\n".to_vec()
}

/// Extractor that returns fixed text without touching pdfium.
pub struct FixedExtractor(pub String);

#[async_trait]
impl TextExtractor for FixedExtractor {
    async fn extract(&self, _name: &str, _bytes: &[u8]) -> Result<String> {
        Ok(self.0.clone())
    }
}
