//! # paperlens
//!
//! A personal research-paper library: drop in PDFs (or paper URLs) and get
//! back a structured, reviewer-style analysis from an LLM, organised with
//! tags, favourites and collections.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / URL
//!  │
//!  ├─ 1. Input    read the file, check the %PDF magic
//!  ├─ 2. Extract  page text via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Analyse  one provider call → 11-field JSON analysis
//!  │              gemini: schema-enforced │ others: prompt + cleanup
//!  ├─ 4. Store    status machine, tags, collections, SQLite snapshot
//!  └─ 5. Mirror   optional upsert to the hosted backend (non-fatal)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paperlens::{Ingestor, Library, Provider};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let library = Library::open_path(&PathBuf::from("library.db"))?;
//!     library.update(|s| s.set_api_key(Provider::Gemini, "AIza..."))?;
//!
//!     let outcomes = Ingestor::new(library.clone())
//!         .ingest_files(&[PathBuf::from("attention.pdf")])
//!         .await?;
//!     for o in outcomes {
//!         println!("{} → {}", o.name, o.status);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `paperlens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paperlens = { version = "0.3", default-features = false }
//! ```
//!
//! ## Providers
//!
//! | Provider | Dialect | Text ceiling |
//! |----------|---------|--------------|
//! | `gemini` | generateContent + response schema | 500 000 chars |
//! | `siliconflow` | chat/completions | 500 000 chars |
//! | `openai`, `minimax`, `moonshot`, `zhipu`, `deepseek`, `qwen` | chat/completions | 100 000 chars |
//!
//! URL analysis always uses Gemini with Google Search grounding.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod chat;
pub mod cloud;
pub mod config;
pub mod error;
pub mod ingest;
pub mod model;
pub mod persist;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_text, analyze_url, truncate_for_provider};
pub use chat::ChatSession;
pub use cloud::{schema_sql, CloudClient, CloudUser, Session};
pub use config::{AiConfig, AiConfigBuilder, CloudConfig, Provider};
pub use error::{PaperError, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use model::{Analysis, Collection, Document, DocumentStatus, Filter, Language, ViewMode};
pub use persist::KvStore;
pub use pipeline::extract::{PdfiumExtractor, TextExtractor};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use providers::{AnalysisProvider, ChatRole, ChatTurn, TokenStream};
pub use store::{Library, LibraryState, PersistedLibrary};
