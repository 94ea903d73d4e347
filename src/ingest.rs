//! Ingest pipeline: PDFs or paper URLs in, analysed library documents out.
//!
//! ## Per-document lifecycle
//!
//! ```text
//! file:  New ──(upload)──▶ Extracting ──▶ Analyzing ──▶ Complete
//!                               │              │
//!                               └──────────────┴──────▶ Error
//! url:   New ──▶ Analyzing ──▶ Complete | Error
//! ```
//!
//! Every document of a batch runs as its own future and all of them are
//! awaited together; one failing document never affects another. Failures
//! end up as the document's `Error` status and message rather than as an
//! error of the batch. Only the up-front checks (missing key, no PDF among
//! the inputs) fail the whole call, and they do so before any document is
//! created or any request is sent.

use crate::analyze::{analyze_text, analyze_url, require_url_key};
use crate::config::AiConfig;
use crate::error::{PaperError, Result};
use crate::model::{Document, DocumentStatus, Language};
use crate::pipeline::extract::{PdfiumExtractor, TextExtractor};
use crate::pipeline::input::{self, PdfInput};
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::store::Library;
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Final state of one ingested document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub id: String,
    /// Upload name, or the title guessed from the URL.
    pub name: String,
    pub status: DocumentStatus,
    pub error: Option<String>,
}

impl IngestOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == DocumentStatus::Complete
    }
}

/// Drives documents from input to stored analysis.
pub struct Ingestor {
    library: Library,
    extractor: Arc<dyn TextExtractor>,
    progress: ProgressCallback,
    ai_override: Option<AiConfig>,
}

impl Ingestor {
    /// Ingestor using pdfium for extraction.
    pub fn new(library: Library) -> Self {
        Self {
            library,
            extractor: Arc::new(PdfiumExtractor::default()),
            progress: Arc::new(NoopProgressCallback),
            ai_override: None,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn TextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// Use `config` instead of the library's stored AI settings.
    pub fn with_ai_config(mut self, config: AiConfig) -> Self {
        self.ai_override = Some(config);
        self
    }

    pub fn library(&self) -> &Library {
        &self.library
    }

    fn ai_config(&self) -> AiConfig {
        self.ai_override
            .clone()
            .unwrap_or_else(|| self.library.ai_config())
    }

    /// Ingest local files. Inputs that are not readable PDFs are skipped.
    pub async fn ingest_files(&self, paths: &[PathBuf]) -> Result<Vec<IngestOutcome>> {
        self.ai_config().require_active_key()?;

        let mut inputs = Vec::with_capacity(paths.len());
        let mut skipped = 0usize;
        for path in paths {
            match input::read_local(path).await {
                Ok(pdf) => inputs.push(pdf),
                Err(e) => {
                    skipped += 1;
                    warn!("Skipping {}: {}", path.display(), e);
                    self.progress.on_skipped(&input::file_name(path), &e.to_string());
                }
            }
        }
        if inputs.is_empty() {
            return Err(PaperError::NoPdfInputs { skipped });
        }
        Ok(self.run_batch(inputs).await)
    }

    /// Ingest one in-memory PDF.
    pub async fn ingest_bytes(&self, name: &str, bytes: Vec<u8>) -> Result<IngestOutcome> {
        self.ai_config().require_active_key()?;
        let pdf = input::from_bytes(name, bytes).map_err(|e| {
            self.progress.on_skipped(name, &e.to_string());
            match e {
                PaperError::NotAPdf { .. } => PaperError::NoPdfInputs { skipped: 1 },
                other => other,
            }
        })?;
        let mut outcomes = self.run_batch(vec![pdf]).await;
        outcomes
            .pop()
            .ok_or_else(|| PaperError::Internal("batch produced no outcome".into()))
    }

    async fn run_batch(&self, inputs: Vec<PdfInput>) -> Vec<IngestOutcome> {
        let total = inputs.len();
        let started = Instant::now();
        let config = self.ai_config();
        let language = self.library.analysis_language();
        info!("Ingesting {} PDF(s) with {}", total, config.active_provider);
        self.progress.on_batch_start(total);

        let outcomes = join_all(
            inputs
                .into_iter()
                .map(|pdf| self.process_file(pdf, &config, language)),
        )
        .await;

        let ok = outcomes.iter().filter(|o| o.is_complete()).count();
        info!(
            "Ingest finished: {}/{} complete in {:.1}s",
            ok,
            total,
            started.elapsed().as_secs_f64()
        );
        self.progress.on_batch_complete(total, ok);
        outcomes
    }

    async fn process_file(
        &self,
        pdf: PdfInput,
        config: &AiConfig,
        language: Language,
    ) -> IngestOutcome {
        let doc = Document::from_file(pdf.name.clone(), pdf.bytes.clone());
        let id = doc.id.clone();
        if let Err(e) = self.library.add_document(doc).await {
            error!("Could not store {}: {}", pdf.name, e);
            self.progress.on_document_error(&id, &pdf.name, &e.to_string());
            return IngestOutcome {
                id,
                name: pdf.name,
                status: DocumentStatus::Error,
                error: Some(e.to_string()),
            };
        }
        self.progress.on_status(&id, &pdf.name, DocumentStatus::New);

        match self.library.upload_pdf(&pdf.name, pdf.bytes.clone()).await {
            Ok(Some(path)) => {
                if let Err(e) = self.library.set_storage_path(&id, path).await {
                    warn!("Could not record storage path for {}: {}", pdf.name, e);
                }
            }
            Ok(None) => {}
            Err(e) => self.library.record_cloud_error(&e),
        }

        let result = self.extract_and_analyze(&id, &pdf, config, language).await;
        self.finish(id, pdf.name, result.map_err(|e| e.to_string())).await
    }

    async fn extract_and_analyze(
        &self,
        id: &str,
        pdf: &PdfInput,
        config: &AiConfig,
        language: Language,
    ) -> Result<String> {
        self.transition(id, &pdf.name, DocumentStatus::Extracting).await?;
        let text = self.extractor.extract(&pdf.name, &pdf.bytes).await?;
        self.library.update(|s| s.set_extracted_text(id, text.clone()))?;

        self.transition(id, &pdf.name, DocumentStatus::Analyzing).await?;
        let analysis = analyze_text(&text, config, language).await?;
        let title = analysis.title.clone();
        self.library
            .set_analysis(id, analysis)
            .await?
            .ok_or_else(|| PaperError::DocumentNotFound(id.to_string()))?;
        Ok(title)
    }

    /// Analyse a paper from its URL.
    pub async fn ingest_url(&self, url: &str) -> Result<IngestOutcome> {
        let config = self.ai_config();
        require_url_key(&config)?;
        let language = self.library.analysis_language();

        let doc = Document::from_url(url);
        let id = doc.id.clone();
        let name = doc.original_title.clone();
        self.library.add_document(doc).await?;
        self.progress.on_batch_start(1);
        self.progress.on_status(&id, &name, DocumentStatus::New);

        let result = async {
            self.transition(&id, &name, DocumentStatus::Analyzing).await?;
            let analysis = analyze_url(url, &config, language).await?;
            let title = analysis.title.clone();
            self.library
                .set_analysis(&id, analysis)
                .await?
                .ok_or_else(|| PaperError::DocumentNotFound(id.clone()))?;
            Ok::<_, PaperError>(title)
        }
        .await;

        let outcome = self
            .finish(id, name, result.map_err(|e| format!("Analysis failed. {e}")))
            .await;
        self.progress
            .on_batch_complete(1, usize::from(outcome.is_complete()));
        Ok(outcome)
    }

    async fn transition(&self, id: &str, name: &str, status: DocumentStatus) -> Result<()> {
        self.library
            .set_status(id, status, None)
            .await?
            .ok_or_else(|| PaperError::DocumentNotFound(id.to_string()))?;
        self.progress.on_status(id, name, status);
        Ok(())
    }

    /// Record the end state of a document and report it.
    async fn finish(
        &self,
        id: String,
        name: String,
        result: std::result::Result<String, String>,
    ) -> IngestOutcome {
        match result {
            Ok(title) => {
                info!("Analysed '{}' as '{}'", name, title);
                self.progress.on_status(&id, &name, DocumentStatus::Complete);
                self.progress.on_document_complete(&id, &title);
                IngestOutcome {
                    id,
                    name,
                    status: DocumentStatus::Complete,
                    error: None,
                }
            }
            Err(message) => {
                error!("Failed to process '{}': {}", name, message);
                if let Err(e) = self
                    .library
                    .set_status(&id, DocumentStatus::Error, Some(message.clone()))
                    .await
                {
                    warn!("Could not mark {} as failed: {}", id, e);
                }
                self.progress.on_document_error(&id, &name, &message);
                IngestOutcome {
                    id,
                    name,
                    status: DocumentStatus::Error,
                    error: Some(message),
                }
            }
        }
    }
}
