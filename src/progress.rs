//! Progress-callback trait for per-document ingest events.
//!
//! Pass an [`Arc<dyn IngestProgressCallback>`] to
//! [`crate::ingest::Ingestor::with_progress`] to be told as each document
//! moves through its lifecycle.
//!
//! The callback approach keeps the library ignorant of how the host reports
//! progress: a terminal bar, a log line or a channel all fit behind it.
//!
//! # Example
//!
//! ```rust
//! use paperlens::{DocumentStatus, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, _id: &str, title: &str) {
//!         let done = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("{done}: {title}");
//!     }
//! }
//!
//! let cb: Arc<dyn IngestProgressCallback> = Arc::new(CountingCallback {
//!     finished: AtomicUsize::new(0),
//! });
//! cb.on_document_complete("id", "Attention Is All You Need");
//! ```

use crate::model::DocumentStatus;
use std::sync::Arc;

/// Called by the ingest pipeline as documents change state.
///
/// Documents are processed concurrently, so every method may be called from
/// several tasks at once. All methods default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once with the number of documents that will be processed.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called for each input that was skipped (not a PDF, unreadable).
    fn on_skipped(&self, name: &str, reason: &str) {
        let _ = (name, reason);
    }

    /// Called on every lifecycle transition of a document.
    ///
    /// # Arguments
    /// * `id`     — document identifier
    /// * `name`   — upload name or URL-derived title
    /// * `status` — the status just entered
    fn on_status(&self, id: &str, name: &str, status: DocumentStatus) {
        let _ = (id, name, status);
    }

    /// Called when the analysis is stored. `title` is the analysed title.
    fn on_document_complete(&self, id: &str, title: &str) {
        let _ = (id, title);
    }

    /// Called when a document ends in the error state.
    fn on_document_error(&self, id: &str, name: &str, error: &str) {
        let _ = (id, name, error);
    }

    /// Called once after every document has finished, either way.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// Callback that ignores every event; the default.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// The shared form the pipeline stores.
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        transitions: AtomicUsize,
        completes: AtomicUsize,
        errors: AtomicUsize,
        batch_total: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_batch_start(&self, total: usize) {
            self.batch_total.store(total, Ordering::SeqCst);
        }

        fn on_status(&self, _id: &str, _name: &str, _status: DocumentStatus) {
            self.transitions.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_complete(&self, _id: &str, _title: &str) {
            self.completes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_document_error(&self, _id: &str, _name: &str, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_skipped("notes.txt", "not a PDF");
        cb.on_status("1", "a.pdf", DocumentStatus::Extracting);
        cb.on_document_error("1", "a.pdf", "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_batch_start(2);
        tracker.on_status("1", "a.pdf", DocumentStatus::New);
        tracker.on_status("1", "a.pdf", DocumentStatus::Extracting);
        tracker.on_document_complete("1", "A");
        tracker.on_status("2", "b.pdf", DocumentStatus::New);
        tracker.on_document_error("2", "b.pdf", "corrupt");

        assert_eq!(tracker.batch_total.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.transitions.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.completes.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.errors.load(Ordering::SeqCst), 1);
    }
}
