//! Pipeline stages between a PDF on disk and a provider request.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ extract ──▶ (analysis adapter) ──▶ postprocess
//! (path)    (pdfium)     crate::providers       (JSON cleanup)
//! ```
//!
//! 1. [`input`]   — read the file, check the `%PDF` magic
//! 2. [`extract`] — walk pages with pdfium inside `spawn_blocking`, join text
//! 3. [`postprocess`] — strip code fences around JSON returned by
//!    prompt-engineered providers before parsing

pub mod extract;
pub mod input;
pub mod postprocess;
