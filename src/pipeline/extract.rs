//! PDF text extraction via pdfium.
//!
//! The extractor walks pages in order and concatenates the text pdfium
//! recognises on each one, separating pages with a blank line. There is no
//! layout analysis: the analysis prompt only needs the words.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and must not run on Tokio worker threads. Each extraction binds the
//! library and loads the document inside `tokio::task::spawn_blocking`.

use crate::error::{PaperError, Result};
use async_trait::async_trait;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// Turns PDF bytes into plain text.
///
/// The ingest pipeline depends on this trait rather than on pdfium directly,
/// so tests and embedders can plug in their own extractor.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String>;
}

/// Default extractor backed by pdfium.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    /// Password for encrypted documents.
    pub password: Option<String>,
}

impl PdfiumExtractor {
    pub fn with_password(password: impl Into<String>) -> Self {
        Self {
            password: Some(password.into()),
        }
    }
}

#[async_trait]
impl TextExtractor for PdfiumExtractor {
    async fn extract(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let name = name.to_string();
        let bytes = bytes.to_vec();
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || extract_blocking(&name, &bytes, password.as_deref()))
            .await
            .map_err(|e| PaperError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

/// Bind pdfium: `PDFIUM_LIB_PATH` first, then the working directory, then the system.
pub fn bind_pdfium() -> Result<Pdfium> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| PaperError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of text extraction.
fn extract_blocking(name: &str, bytes: &[u8], password: Option<&str>) -> Result<String> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            PaperError::PasswordRequired {
                name: name.to_string(),
            }
        } else {
            PaperError::CorruptPdf {
                name: name.to_string(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    info!("{}: {} pages", name, pages.len());

    let mut page_texts = Vec::with_capacity(pages.len() as usize);
    for (idx, page) in pages.iter().enumerate() {
        let text = page.text().map_err(|e| PaperError::CorruptPdf {
            name: name.to_string(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        let text = text.all();
        debug!("{}: page {} → {} chars", name, idx + 1, text.len());
        page_texts.push(text);
    }

    Ok(join_pages(&page_texts))
}

/// Join per-page text: runs on one line separated by single spaces, pages
/// separated by a blank line, each page terminated the same way.
pub fn join_pages<S: AsRef<str>>(pages: &[S]) -> String {
    let mut full = String::new();
    for page in pages {
        let words: Vec<&str> = page.as_ref().split_whitespace().collect();
        full.push_str(&words.join(" "));
        full.push_str("\n\n");
    }
    full
}
