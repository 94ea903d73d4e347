//! Input resolution: turn a user-supplied path into validated PDF bytes.
//!
//! pdfium loads from a byte slice, so every input is read fully into memory.
//! The `%PDF` magic is checked before anything else so callers get a
//! meaningful error rather than a pdfium failure, and so the ingest pipeline
//! can skip non-PDF files the way an upload filter would.

use crate::error::{PaperError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A PDF that passed the magic-byte check.
#[derive(Debug, Clone)]
pub struct PdfInput {
    /// File name shown as the document's original title.
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// True when `bytes` begin with the PDF magic.
pub fn has_pdf_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && &bytes[..4] == b"%PDF"
}

/// Validate in-memory bytes and wrap them as a [`PdfInput`].
pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>) -> Result<PdfInput> {
    let name = name.into();
    if !has_pdf_magic(&bytes) {
        return Err(PaperError::NotAPdf {
            name,
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(PdfInput { name, bytes })
}

/// Read a local file, validating existence, permissions and PDF magic bytes.
pub async fn read_local(path: &Path) -> Result<PdfInput> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PaperError::FileNotFound {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::PermissionDenied => PaperError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => PaperError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let input = from_bytes(file_name(path), bytes)?;
    debug!("Resolved local PDF: {} ({} bytes)", path.display(), input.bytes.len());
    Ok(input)
}

/// Final path component, or the whole path when there is none.
pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// File extension for remote object names; `pdf` when absent.
pub fn extension(name: &str) -> String {
    PathBuf::from(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_else(|| "pdf".to_string())
}
