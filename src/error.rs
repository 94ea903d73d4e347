//! Error types for the paperlens library.
//!
//! A single enum, [`PaperError`], grouped by where a failure originates:
//!
//! * **Configuration** — no API key for the active provider, bad settings.
//! * **Extraction** — the input is missing, not a PDF, or pdfium rejects it.
//! * **Analysis** — the provider call failed, returned nothing, or returned
//!   something that does not parse into an [`crate::model::Analysis`].
//! * **Cloud** — the hosted backend refused the request. These never abort a
//!   local operation; the store keeps the message in
//!   [`crate::store::LibraryState::last_cloud_error`].
//! * **Store** — an illegal lifecycle transition or an unknown identifier.
//!
//! The ingest pipeline catches errors at the document level and turns them
//! into an `Error` status with the message; nothing is retried.

use crate::model::DocumentStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PaperError>;

/// All errors returned by the paperlens library.
#[derive(Debug, Error)]
pub enum PaperError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The active provider has no API key configured.
    #[error("{provider} API key is missing.\n{hint}")]
    MissingApiKey { provider: String, hint: String },

    /// Settings failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The provider name does not match any known provider.
    #[error("Unknown provider '{0}'")]
    UnsupportedProvider(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The bytes do not start with the `%PDF` magic.
    #[error("'{name}' is not a valid PDF (first bytes: {magic:?})")]
    NotAPdf { name: String, magic: Vec<u8> },

    /// pdfium could not parse the document.
    #[error("Failed to extract text from '{name}': {detail}")]
    CorruptPdf { name: String, detail: String },

    /// The PDF is encrypted and needs a password.
    #[error("'{name}' is encrypted and requires a password")]
    PasswordRequired { name: String },

    /// None of the supplied inputs was a PDF.
    #[error("Please supply valid PDF files ({skipped} input(s) skipped)")]
    NoPdfInputs { skipped: usize },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, or place the library next to the\n\
binary or in a system library directory.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Analysis errors ───────────────────────────────────────────────────
    /// The provider answered with a non-success HTTP status.
    #[error("AI provider error ({status}): {body}")]
    ProviderHttp { status: u16, body: String },

    /// The request never produced a response (connection refused, TLS, …).
    #[error("Request to {provider} failed: {detail}")]
    Http { provider: String, detail: String },

    /// The provider answered but the message carried no text.
    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },

    /// The provider's text did not parse into the analysis schema.
    #[error("Failed to parse {provider} response as JSON: {detail}")]
    MalformedResponse { provider: String, detail: String },

    /// The grounded search step for URL analysis came back empty.
    #[error("Could not retrieve information about '{url}'. The search returned no results.")]
    SearchReturnedNothing { url: String },

    // ── Cloud errors ──────────────────────────────────────────────────────
    /// Cloud sync is enabled but nobody is signed in.
    #[error("Sync failed: you are not logged in. Run `paperlens cloud login` first.")]
    CloudNotAuthenticated,

    /// The `papers` table (or its API exposure) does not exist yet.
    #[error("Database setup incomplete. Run the SQL from `paperlens cloud schema` in the backend's SQL editor.")]
    CloudSchemaMissing,

    /// Row-level security rejected the request.
    #[error("Permission denied. Check the row-level security policies of the backend.")]
    CloudPermissionDenied,

    /// A record identifier is not a valid UUID for the backend.
    #[error("Sync error: local data uses invalid identifiers. Delete the affected documents and re-upload them.")]
    CloudInvalidIdentifier,

    /// Any other backend failure.
    #[error("Cloud error: {message}")]
    Cloud { message: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// A status change that the document lifecycle does not allow.
    #[error("Document {id}: cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        id: String,
        from: DocumentStatus,
        to: DocumentStatus,
    },

    /// No document with this identifier.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// No collection with this identifier.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// The embedded database failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A snapshot or record could not be (de)serialised.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading or writing a file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PaperError {
    /// True for failures of the hosted backend, which never abort local work.
    pub fn is_cloud(&self) -> bool {
        matches!(
            self,
            PaperError::CloudNotAuthenticated
                | PaperError::CloudSchemaMissing
                | PaperError::CloudPermissionDenied
                | PaperError::CloudInvalidIdentifier
                | PaperError::Cloud { .. }
        )
    }
}

impl From<rusqlite::Error> for PaperError {
    fn from(e: rusqlite::Error) -> Self {
        PaperError::Persistence(e.to_string())
    }
}
