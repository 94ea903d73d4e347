//! The library: documents, collections, settings and view state.
//!
//! [`LibraryState`] is plain data with synchronous mutators; it never does
//! I/O, which keeps every rule testable without a runtime. [`Library`] puts
//! it behind one mutex, writes a snapshot to the [`KvStore`] after each
//! mutation, and mirrors document changes to the cloud backend when cloud
//! sync is active.
//!
//! ## Locking
//!
//! Each mutation is one critical section over the whole state, including
//! the SQLite write of the resulting snapshot.
//! Network calls (cloud mirror, provider calls in the ingest pipeline) run
//! with the lock released, so a completion can arrive for a document that
//! was deleted meanwhile; such updates find no document and do nothing.

use crate::cloud::CloudClient;
use crate::config::{AiConfig, CloudConfig, Provider};
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Collection, Document, DocumentStatus, Filter, Language, ViewMode};
use crate::persist::{self, KvStore, LIBRARY_KEY, SESSION_KEY};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

// ── Snapshot ─────────────────────────────────────────────────────────────

/// What is written to disk and to export files.
///
/// Every field is optional so partial backups import cleanly: absent parts
/// leave the current state untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLibrary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_config: Option<AiConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<Collection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_language: Option<Language>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_config: Option<CloudConfig>,
    /// Single key from before per-provider keys existed; read, never written.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

// ── State ────────────────────────────────────────────────────────────────

/// All library data.
#[derive(Debug, Clone, Default)]
pub struct LibraryState {
    /// Newest first.
    pub documents: Vec<Document>,
    pub collections: Vec<Collection>,
    pub ai_config: AiConfig,
    pub cloud_config: CloudConfig,
    pub analysis_language: Language,
    pub active_document: Option<String>,
    pub view_mode: ViewMode,
    pub active_filter: Filter,
    pub last_cloud_error: Option<String>,
}

impl LibraryState {
    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == id)
    }

    fn document_mut(&mut self, id: &str) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| d.id == id)
    }

    pub fn collection(&self, id: &str) -> Option<&Collection> {
        self.collections.iter().find(|c| c.id == id)
    }

    /// Apply `f` to the document and return a copy of the result.
    fn modify(&mut self, id: &str, f: impl FnOnce(&mut Document)) -> Option<Document> {
        let doc = self.document_mut(id)?;
        f(doc);
        Some(doc.clone())
    }

    // ── Documents ────────────────────────────────────────────────────────

    pub fn add_document(&mut self, doc: Document) {
        self.documents.insert(0, doc);
    }

    /// Move a document through its lifecycle. `error` is kept only with
    /// [`DocumentStatus::Error`]. Setting the current status again is allowed
    /// and only refreshes the message.
    pub fn set_status(
        &mut self,
        id: &str,
        status: DocumentStatus,
        error: Option<String>,
    ) -> Result<Option<Document>> {
        let Some(doc) = self.document_mut(id) else {
            return Ok(None);
        };
        if doc.status != status && !doc.status.can_transition_to(status) {
            return Err(PaperError::InvalidTransition {
                id: id.to_string(),
                from: doc.status,
                to: status,
            });
        }
        doc.status = status;
        doc.error_message = if status == DocumentStatus::Error { error } else { None };
        Ok(Some(doc.clone()))
    }

    /// Store a finished analysis, completing the document and merging the
    /// suggested tags into its tags.
    pub fn set_analysis(&mut self, id: &str, analysis: Analysis) -> Result<Option<Document>> {
        let Some(doc) = self.document_mut(id) else {
            return Ok(None);
        };
        if !doc.status.can_transition_to(DocumentStatus::Complete) {
            return Err(PaperError::InvalidTransition {
                id: id.to_string(),
                from: doc.status,
                to: DocumentStatus::Complete,
            });
        }
        for tag in &analysis.suggested_tags {
            push_tag(&mut doc.tags, tag);
        }
        doc.analysis = Some(analysis);
        doc.status = DocumentStatus::Complete;
        doc.error_message = None;
        Ok(Some(doc.clone()))
    }

    pub fn set_extracted_text(&mut self, id: &str, text: String) -> Option<Document> {
        self.modify(id, |d| d.extracted_text = Some(text))
    }

    pub fn set_storage_path(&mut self, id: &str, path: String) -> Option<Document> {
        self.modify(id, |d| d.storage_path = Some(path))
    }

    pub fn set_notes(&mut self, id: &str, notes: impl Into<String>) -> Option<Document> {
        let notes = notes.into();
        self.modify(id, |d| d.user_notes = notes)
    }

    pub fn toggle_favorite(&mut self, id: &str) -> Option<Document> {
        self.modify(id, |d| d.is_favorite = !d.is_favorite)
    }

    pub fn mark_read(&mut self, id: &str) -> Option<Document> {
        self.modify(id, |d| d.is_read = true)
    }

    /// Add a tag unless the document already has it.
    pub fn add_tag(&mut self, id: &str, tag: &str) -> Option<Document> {
        let tag = tag.trim();
        if tag.is_empty() {
            return self.document(id).cloned();
        }
        self.modify(id, |d| push_tag(&mut d.tags, tag))
    }

    pub fn remove_tag(&mut self, id: &str, tag: &str) -> Option<Document> {
        self.modify(id, |d| d.tags.retain(|t| t != tag))
    }

    /// Remove a document; closes the reader when it was open.
    pub fn delete_document(&mut self, id: &str) -> Option<Document> {
        let pos = self.documents.iter().position(|d| d.id == id)?;
        let removed = self.documents.remove(pos);
        if self.active_document.as_deref() == Some(id) {
            self.close_reader();
        }
        Some(removed)
    }

    // ── Collections ──────────────────────────────────────────────────────

    pub fn create_collection(&mut self, name: impl Into<String>) -> Collection {
        let collection = Collection::new(name);
        self.collections.push(collection.clone());
        collection
    }

    pub fn rename_collection(&mut self, id: &str, name: impl Into<String>) -> Result<()> {
        let c = self
            .collections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| PaperError::CollectionNotFound(id.to_string()))?;
        c.name = name.into();
        Ok(())
    }

    /// Remove a collection and every membership in it; an active filter on it
    /// falls back to [`Filter::All`].
    pub fn delete_collection(&mut self, id: &str) -> Option<Collection> {
        let pos = self.collections.iter().position(|c| c.id == id)?;
        let removed = self.collections.remove(pos);
        for doc in &mut self.documents {
            doc.collection_ids.retain(|c| c != id);
        }
        if matches!(&self.active_filter, Filter::Collection(c) if c == id) {
            self.active_filter = Filter::All;
        }
        Some(removed)
    }

    pub fn add_to_collection(
        &mut self,
        doc_id: &str,
        collection_id: &str,
    ) -> Result<Option<Document>> {
        if self.collection(collection_id).is_none() {
            return Err(PaperError::CollectionNotFound(collection_id.to_string()));
        }
        Ok(self.modify(doc_id, |d| {
            if !d.in_collection(collection_id) {
                d.collection_ids.push(collection_id.to_string());
            }
        }))
    }

    pub fn remove_from_collection(
        &mut self,
        doc_id: &str,
        collection_id: &str,
    ) -> Option<Document> {
        self.modify(doc_id, |d| d.collection_ids.retain(|c| c != collection_id))
    }

    // ── View ─────────────────────────────────────────────────────────────

    /// Switch to the reader for `id`; unknown ids change nothing.
    pub fn open_document(&mut self, id: &str) -> bool {
        if self.document(id).is_none() {
            return false;
        }
        self.active_document = Some(id.to_string());
        self.view_mode = ViewMode::Reader;
        true
    }

    pub fn close_reader(&mut self) {
        self.active_document = None;
        self.view_mode = ViewMode::Dashboard;
    }

    /// Select the inbox subset; always returns to the dashboard.
    pub fn set_filter(&mut self, filter: Filter) {
        self.active_filter = filter;
        self.close_reader();
    }

    pub fn filtered_documents(&self) -> Vec<&Document> {
        self.documents.iter().filter(|d| self.active_filter.matches(d)).collect()
    }

    /// Every tag in use, sorted.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .documents
            .iter()
            .flat_map(|d| d.tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    // ── Settings ─────────────────────────────────────────────────────────

    pub fn set_ai_config(&mut self, mut config: AiConfig) {
        config.ensure_key_slots();
        self.ai_config = config;
    }

    pub fn set_api_key(&mut self, provider: Provider, key: impl Into<String>) {
        self.ai_config.keys.insert(provider, key.into().trim().to_string());
    }

    /// Override (or with `None`, reset) the provider's endpoint.
    pub fn set_base_url(&mut self, provider: Provider, url: Option<String>) {
        match url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            Some(u) => {
                self.ai_config.base_urls.insert(provider, u);
            }
            None => {
                self.ai_config.base_urls.remove(&provider);
            }
        }
    }

    /// Replace the cloud settings. Returns whether the endpoint changed, in
    /// which case any existing session no longer applies.
    pub fn set_cloud_config(&mut self, config: CloudConfig) -> bool {
        let changed = self.cloud_config.endpoint_changed(&config);
        self.cloud_config = config;
        self.last_cloud_error = None;
        changed
    }

    pub fn set_analysis_language(&mut self, language: Language) {
        self.analysis_language = language;
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> PersistedLibrary {
        PersistedLibrary {
            ai_config: Some(self.ai_config.clone()),
            documents: Some(self.documents.clone()),
            collections: Some(self.collections.clone()),
            analysis_language: Some(self.analysis_language),
            cloud_config: Some(self.cloud_config.clone()),
            api_key: None,
        }
    }

    /// Replace whatever the snapshot carries and migrate old settings.
    pub fn import(&mut self, snapshot: PersistedLibrary) {
        if let Some(config) = snapshot.ai_config {
            self.set_ai_config(config);
        }
        if let Some(legacy) = snapshot.api_key.filter(|k| !k.trim().is_empty()) {
            if self.ai_config.key(Provider::Gemini).is_none() {
                info!("Migrating legacy API key to the gemini slot");
                self.set_api_key(Provider::Gemini, legacy);
            }
        }
        self.ai_config.ensure_key_slots();
        if let Some(mut docs) = snapshot.documents {
            docs.iter_mut().for_each(Document::settle_status);
            self.documents = docs;
        }
        if let Some(collections) = snapshot.collections {
            self.collections = collections;
        }
        if let Some(language) = snapshot.analysis_language {
            self.analysis_language = language;
        }
        if let Some(cloud) = snapshot.cloud_config {
            self.cloud_config = cloud;
        }

        if let Some(id) = self.active_document.clone() {
            if self.document(&id).is_none() {
                self.close_reader();
            }
        }
        if let Filter::Collection(id) = &self.active_filter {
            if self.collection(id).is_none() {
                self.active_filter = Filter::All;
            }
        }
    }

    /// Fold a cloud listing into the local documents.
    ///
    /// Cloud rows replace local ones by id but keep the device-only fields
    /// (cached PDF, extracted text, collections, read flag); a document being
    /// analysed locally keeps that status. Local documents the cloud does not
    /// know follow the cloud rows.
    pub fn merge_cloud(&mut self, records: Vec<Document>) {
        let mut locals = std::mem::take(&mut self.documents);
        let mut merged = Vec::with_capacity(records.len() + locals.len());

        for mut remote in records {
            if let Some(pos) = locals.iter().position(|d| d.id == remote.id) {
                let local = locals.remove(pos);
                remote.file_data = local.file_data;
                remote.extracted_text = local.extracted_text;
                remote.collection_ids = local.collection_ids;
                remote.is_read = local.is_read;
                if local.status == DocumentStatus::Analyzing {
                    remote.status = DocumentStatus::Analyzing;
                    remote.analysis = local.analysis;
                }
            }
            remote.settle_status();
            merged.push(remote);
        }
        merged.extend(locals);

        self.documents = merged;
        self.cloud_config.last_sync = Some(Utc::now());
        self.last_cloud_error = None;
    }
}

fn push_tag(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

// ── Library ──────────────────────────────────────────────────────────────

struct Shared {
    state: Mutex<LibraryState>,
    kv: Option<Arc<KvStore>>,
    cloud: Mutex<Option<Arc<CloudClient>>>,
}

/// Shared handle to the library. Cheap to clone.
#[derive(Clone)]
pub struct Library {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library").field("kv", &self.shared.kv).finish_non_exhaustive()
    }
}

impl Library {
    /// A library that lives only in memory.
    pub fn in_memory(state: LibraryState) -> Self {
        Self::with_parts(state, None)
    }

    /// Load the library persisted in `kv` (or start empty).
    pub fn open(kv: Arc<KvStore>) -> Result<Self> {
        let mut state = LibraryState::default();
        if let Some(snapshot) = kv.get_json::<PersistedLibrary>(LIBRARY_KEY)? {
            state.import(snapshot);
            debug!("Loaded {} document(s) from {:?}", state.documents.len(), kv.path());
        }
        Ok(Self::with_parts(state, Some(kv)))
    }

    /// Open the SQLite database at `path`.
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Arc::new(KvStore::open(path)?))
    }

    fn with_parts(state: LibraryState, kv: Option<Arc<KvStore>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                kv,
                cloud: Mutex::new(None),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LibraryState> {
        // A panic mid-mutation leaves whole-state data; keep serving it.
        self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` against the current state.
    pub fn read<T>(&self, f: impl FnOnce(&LibraryState) -> T) -> T {
        f(&self.lock())
    }

    /// Copy of one document.
    pub fn document(&self, id: &str) -> Option<Document> {
        self.read(|s| s.document(id).cloned())
    }

    /// Copy of the AI settings.
    pub fn ai_config(&self) -> AiConfig {
        self.read(|s| s.ai_config.clone())
    }

    pub fn analysis_language(&self) -> Language {
        self.read(|s| s.analysis_language)
    }

    /// Mutate the state and persist the result.
    ///
    /// The snapshot is written before the lock is released, so snapshots
    /// reach disk in the order the mutations happened.
    pub fn update<T>(&self, f: impl FnOnce(&mut LibraryState) -> T) -> Result<T> {
        let mut state = self.lock();
        let out = f(&mut state);
        if let Some(kv) = &self.shared.kv {
            kv.set_json(LIBRARY_KEY, &state.snapshot())?;
        }
        Ok(out)
    }

    // ── Cloud plumbing ───────────────────────────────────────────────────

    /// Client for the configured backend, or `None` when sync is off.
    pub fn cloud(&self) -> Option<Arc<CloudClient>> {
        let config = self.read(|s| s.cloud_config.clone());
        if !config.is_active() {
            return None;
        }
        let mut slot = self.shared.cloud.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = slot.as_ref() {
            return Some(client.clone());
        }
        match CloudClient::new(&config) {
            Ok(client) => {
                let client = match &self.shared.kv {
                    Some(kv) => client.with_session_store(kv.clone()),
                    None => client,
                };
                let client = Arc::new(client);
                *slot = Some(client.clone());
                Some(client)
            }
            Err(e) => {
                warn!("Cloud sync disabled: {}", e);
                None
            }
        }
    }

    /// Remember a cloud failure for display; local state is unaffected.
    pub fn record_cloud_error(&self, error: &PaperError) {
        warn!("Cloud sync failed: {}", error);
        let message = error.to_string();
        if let Err(e) = self.update(|s| s.last_cloud_error = Some(message)) {
            warn!("Could not persist cloud error: {}", e);
        }
    }

    pub fn last_cloud_error(&self) -> Option<String> {
        self.read(|s| s.last_cloud_error.clone())
    }

    async fn mirror(&self, doc: Option<&Document>) {
        let (Some(doc), Some(cloud)) = (doc, self.cloud()) else {
            return;
        };
        if let Err(e) = cloud.upsert_document(doc).await {
            self.record_cloud_error(&e);
        }
    }

    /// Upload a PDF to cloud storage when sync is active.
    pub async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<Option<String>> {
        match self.cloud() {
            Some(cloud) => cloud.upload_pdf(file_name, bytes).await.map(Some),
            None => Ok(None),
        }
    }

    /// Replace local documents with the cloud listing (see
    /// [`LibraryState::merge_cloud`]). Returns the number of cloud rows.
    pub async fn refresh_from_cloud(&self) -> Result<usize> {
        let Some(cloud) = self.cloud() else {
            return Ok(0);
        };
        match cloud.fetch_documents().await {
            Ok(records) => {
                let n = records.len();
                self.update(|s| s.merge_cloud(records))?;
                info!("Refreshed {} document(s) from cloud", n);
                Ok(n)
            }
            Err(e) => {
                self.record_cloud_error(&e);
                Err(e)
            }
        }
    }

    // ── Mirrored document mutations ──────────────────────────────────────

    pub async fn add_document(&self, doc: Document) -> Result<()> {
        self.update(|s| s.add_document(doc.clone()))?;
        self.mirror(Some(&doc)).await;
        Ok(())
    }

    pub async fn set_status(
        &self,
        id: &str,
        status: DocumentStatus,
        error: Option<String>,
    ) -> Result<Option<Document>> {
        let doc = self.update(|s| s.set_status(id, status, error))??;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn set_analysis(&self, id: &str, analysis: Analysis) -> Result<Option<Document>> {
        let doc = self.update(|s| s.set_analysis(id, analysis))??;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn set_notes(&self, id: &str, notes: &str) -> Result<Option<Document>> {
        let doc = self.update(|s| s.set_notes(id, notes))?;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn toggle_favorite(&self, id: &str) -> Result<Option<Document>> {
        let doc = self.update(|s| s.toggle_favorite(id))?;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn add_tag(&self, id: &str, tag: &str) -> Result<Option<Document>> {
        let doc = self.update(|s| s.add_tag(id, tag))?;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn remove_tag(&self, id: &str, tag: &str) -> Result<Option<Document>> {
        let doc = self.update(|s| s.remove_tag(id, tag))?;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    pub async fn set_storage_path(&self, id: &str, path: String) -> Result<Option<Document>> {
        let doc = self.update(|s| s.set_storage_path(id, path))?;
        self.mirror(doc.as_ref()).await;
        Ok(doc)
    }

    /// Delete locally, then remove the cloud row and stored PDF.
    pub async fn delete_document(&self, id: &str) -> Result<Option<Document>> {
        let removed = self.update(|s| s.delete_document(id))?;
        if let (Some(doc), Some(cloud)) = (&removed, self.cloud()) {
            if let Err(e) = cloud.delete_document(&doc.id, doc.storage_path.as_deref()).await {
                self.record_cloud_error(&e);
            }
        }
        Ok(removed)
    }

    // ── Settings ─────────────────────────────────────────────────────────

    /// Replace the cloud settings, dropping the client and stored session
    /// when the endpoint changed.
    pub fn set_cloud_config(&self, config: CloudConfig) -> Result<()> {
        let changed = self.update(|s| s.set_cloud_config(config))?;
        if changed {
            *self.shared.cloud.lock().unwrap_or_else(|e| e.into_inner()) = None;
            if let Some(kv) = &self.shared.kv {
                kv.remove(SESSION_KEY)?;
            }
            debug!("Cloud endpoint changed; session reset");
        }
        Ok(())
    }

    // ── Export / import ──────────────────────────────────────────────────

    /// Write the full snapshot to a JSON file.
    pub fn export_to(&self, path: &Path) -> Result<()> {
        let snapshot = self.read(LibraryState::snapshot);
        persist::write_json_atomic(path, &snapshot)?;
        info!("Exported library to {}", path.display());
        Ok(())
    }

    /// Load a JSON backup; see [`LibraryState::import`].
    pub fn import_from(&self, path: &Path) -> Result<()> {
        let value = persist::read_json_value(path)?;
        let snapshot: PersistedLibrary = serde_json::from_value(value)?;
        self.update(|s| s.import(snapshot))?;
        info!("Imported library from {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::sample_analysis;

    fn state_with(doc: Document) -> (LibraryState, String) {
        let id = doc.id.clone();
        let mut s = LibraryState::default();
        s.add_document(doc);
        (s, id)
    }

    #[test]
    fn add_prepends() {
        let mut s = LibraryState::default();
        s.add_document(Document::new("a.pdf"));
        s.add_document(Document::new("b.pdf"));
        assert_eq!(s.documents[0].original_title, "b.pdf");
    }

    #[test]
    fn lifecycle_transitions() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        s.set_status(&id, DocumentStatus::Extracting, None).unwrap();
        s.set_status(&id, DocumentStatus::Analyzing, None).unwrap();
        let doc = s.set_analysis(&id, sample_analysis()).unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Complete);
        assert!(doc.analysis.is_some());

        let err = s.set_status(&id, DocumentStatus::Extracting, None).unwrap_err();
        assert!(matches!(err, PaperError::InvalidTransition { .. }));
    }

    #[test]
    fn analysis_requires_analyzing() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        assert!(s.set_analysis(&id, sample_analysis()).is_err());
        assert!(s.document(&id).unwrap().analysis.is_none());
    }

    #[test]
    fn error_message_only_with_error_status() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        s.set_status(&id, DocumentStatus::Extracting, Some("ignored".into())).unwrap();
        assert!(s.document(&id).unwrap().error_message.is_none());
        let doc = s
            .set_status(&id, DocumentStatus::Error, Some("bad pdf".into()))
            .unwrap()
            .unwrap();
        assert_eq!(doc.error_message.as_deref(), Some("bad pdf"));
    }

    #[test]
    fn absent_id_is_noop() {
        let mut s = LibraryState::default();
        assert!(s.set_status("nope", DocumentStatus::Error, None).unwrap().is_none());
        assert!(s.set_analysis("nope", sample_analysis()).unwrap().is_none());
        assert!(s.toggle_favorite("nope").is_none());
        assert!(s.delete_document("nope").is_none());
        assert!(!s.open_document("nope"));
    }

    #[test]
    fn suggested_tags_merge_without_duplicates() {
        let mut doc = Document::new("a.pdf");
        doc.status = DocumentStatus::Analyzing;
        doc.tags = vec!["NLP".into()];
        let (mut s, id) = state_with(doc);
        let doc = s.set_analysis(&id, sample_analysis()).unwrap().unwrap();
        assert_eq!(doc.tags, vec!["NLP".to_string(), "Transformer".to_string()]);
    }

    #[test]
    fn add_tag_is_idempotent() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        s.add_tag(&id, "RL");
        s.add_tag(&id, " RL ");
        s.add_tag(&id, "  ");
        assert_eq!(s.document(&id).unwrap().tags, vec!["RL".to_string()]);
        s.remove_tag(&id, "RL");
        assert!(s.document(&id).unwrap().tags.is_empty());
    }

    #[test]
    fn delete_closes_reader() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        assert!(s.open_document(&id));
        assert_eq!(s.view_mode, ViewMode::Reader);
        s.delete_document(&id);
        assert_eq!(s.view_mode, ViewMode::Dashboard);
        assert!(s.active_document.is_none());
    }

    #[test]
    fn collections_membership() {
        let (mut s, id) = state_with(Document::new("a.pdf"));
        let c = s.create_collection("Reading");
        s.add_to_collection(&id, &c.id).unwrap();
        s.add_to_collection(&id, &c.id).unwrap();
        assert_eq!(s.document(&id).unwrap().collection_ids.len(), 1);

        assert!(matches!(
            s.add_to_collection(&id, "missing"),
            Err(PaperError::CollectionNotFound(_))
        ));

        s.set_filter(Filter::Collection(c.id.clone()));
        assert_eq!(s.filtered_documents().len(), 1);

        s.delete_collection(&c.id);
        assert!(s.document(&id).unwrap().collection_ids.is_empty());
        assert_eq!(s.active_filter, Filter::All);
    }

    #[test]
    fn rename_unknown_collection() {
        let mut s = LibraryState::default();
        assert!(s.rename_collection("x", "y").is_err());
        let c = s.create_collection("a");
        s.rename_collection(&c.id, "b").unwrap();
        assert_eq!(s.collection(&c.id).unwrap().name, "b");
    }

    #[test]
    fn filters() {
        let mut fav = Document::new("fav.pdf");
        fav.is_favorite = true;
        let mut tagged = Document::new("tagged.pdf");
        tagged.tags.push("CV".into());
        let mut s = LibraryState::default();
        s.add_document(fav);
        s.add_document(tagged);

        s.set_filter(Filter::Favorites);
        assert_eq!(s.filtered_documents()[0].original_title, "fav.pdf");
        s.set_filter(Filter::Tag("CV".into()));
        assert_eq!(s.filtered_documents()[0].original_title, "tagged.pdf");
        s.set_filter(Filter::All);
        assert_eq!(s.filtered_documents().len(), 2);
        assert_eq!(s.all_tags(), vec!["CV".to_string()]);
    }

    #[test]
    fn import_migrates_legacy_key() {
        let mut s = LibraryState::default();
        let snapshot: PersistedLibrary =
            serde_json::from_str(r#"{"apiKey": "AIza-legacy"}"#).unwrap();
        s.import(snapshot);
        assert_eq!(s.ai_config.key(Provider::Gemini), Some("AIza-legacy"));
        assert_eq!(s.ai_config.keys.len(), Provider::ALL.len());
    }

    #[test]
    fn import_keeps_absent_parts() {
        let (mut s, _) = state_with(Document::new("keep.pdf"));
        s.import(PersistedLibrary {
            collections: Some(vec![Collection::new("c")]),
            ..Default::default()
        });
        assert_eq!(s.documents.len(), 1);
        assert_eq!(s.collections.len(), 1);
    }

    #[test]
    fn imported_analysis_implies_complete() {
        let mut stale = Document::new("attention.pdf");
        stale.status = DocumentStatus::Extracting;
        stale.analysis = Some(sample_analysis());
        let id = stale.id.clone();

        let mut s = LibraryState::default();
        s.import(PersistedLibrary {
            documents: Some(vec![stale]),
            ..Default::default()
        });
        assert_eq!(s.document(&id).unwrap().status, DocumentStatus::Complete);
    }

    #[test]
    fn snapshot_never_writes_legacy_key() {
        let s = LibraryState::default();
        let v = serde_json::to_value(s.snapshot()).unwrap();
        assert!(v.get("apiKey").is_none());
        assert!(v.get("aiConfig").is_some());
    }

    #[test]
    fn merge_keeps_local_only_fields() {
        let mut local = Document::from_file("a.pdf", b"%PDF-1.7".to_vec());
        local.extracted_text = Some("text".into());
        local.collection_ids = vec!["c1".into()];
        local.is_read = true;
        let id = local.id.clone();
        let local_only = Document::new("local.pdf");

        let mut s = LibraryState::default();
        s.add_document(local_only);
        s.add_document(local);

        let mut remote = Document::new("a.pdf");
        remote.id = id.clone();
        remote.is_favorite = true;
        let other_remote = Document::new("remote.pdf");

        s.merge_cloud(vec![remote, other_remote]);
        assert_eq!(s.documents.len(), 3);
        let merged = s.document(&id).unwrap();
        assert!(merged.is_favorite);
        assert!(merged.file_data.is_some());
        assert_eq!(merged.collection_ids, vec!["c1".to_string()]);
        assert!(merged.is_read);
        assert_eq!(s.documents[2].original_title, "local.pdf");
        assert!(s.cloud_config.last_sync.is_some());
    }

    #[test]
    fn merge_keeps_local_analyzing() {
        let mut local = Document::new("a.pdf");
        local.status = DocumentStatus::Analyzing;
        let id = local.id.clone();
        let mut s = LibraryState::default();
        s.add_document(local);

        let mut remote = Document::new("a.pdf");
        remote.id = id.clone();
        remote.status = DocumentStatus::Complete;
        remote.analysis = Some(sample_analysis());
        s.merge_cloud(vec![remote]);

        let doc = s.document(&id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Analyzing);
        assert!(doc.analysis.is_none());
    }

    #[test]
    fn merged_row_with_analysis_is_complete() {
        let local = Document::new("a.pdf");
        let id = local.id.clone();
        let mut s = LibraryState::default();
        s.add_document(local);

        let mut remote = Document::new("a.pdf");
        remote.id = id.clone();
        remote.status = DocumentStatus::Error;
        remote.error_message = Some("timeout".into());
        remote.analysis = Some(sample_analysis());
        s.merge_cloud(vec![remote]);

        let doc = s.document(&id).unwrap();
        assert_eq!(doc.status, DocumentStatus::Complete);
        assert!(doc.error_message.is_none());
        assert!(s
            .documents
            .iter()
            .all(|d| d.analysis.is_none() || d.status == DocumentStatus::Complete));
    }

    #[test]
    fn cloud_config_change_detected() {
        let mut s = LibraryState::default();
        s.last_cloud_error = Some("old".into());
        let changed = s.set_cloud_config(CloudConfig {
            url: "https://x.example".into(),
            anon_key: "k".into(),
            enabled: true,
            last_sync: None,
        });
        assert!(changed);
        assert!(s.last_cloud_error.is_none());
        let same = s.cloud_config.clone();
        assert!(!s.set_cloud_config(same));
    }

    #[test]
    fn base_url_override_and_reset() {
        let mut s = LibraryState::default();
        s.set_base_url(Provider::OpenAi, Some("http://localhost:1234/v1/".into()));
        assert_eq!(s.ai_config.base_url(Provider::OpenAi), "http://localhost:1234/v1");
        s.set_base_url(Provider::OpenAi, Some("  ".into()));
        assert_eq!(s.ai_config.base_url(Provider::OpenAi), "https://api.openai.com/v1");
    }
}
