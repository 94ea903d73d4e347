//! Optional mirror of the library in a hosted Postgres + object-storage
//! backend, spoken to over its REST surface.
//!
//! ## Surfaces
//!
//! ```text
//! /auth/v1/...                    password sign-in, sign-up, token refresh
//! /rest/v1/papers                 one row per document (upsert by id)
//! /storage/v1/object/papers/...   uploaded PDFs under <user_id>/
//! ```
//!
//! Every call needs the project's anon key; table and storage calls also
//! need a signed-in user's access token, refreshed transparently when it is
//! about to expire. Failures map onto the cloud variants of [`PaperError`]
//! and are never fatal to local work.

use crate::config::CloudConfig;
use crate::error::{PaperError, Result};
use crate::model::{Analysis, Document, DocumentStatus};
use crate::persist::{KvStore, SESSION_KEY};
use crate::pipeline::input::extension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Table holding document rows.
pub const TABLE: &str = "papers";

/// Storage bucket holding uploaded PDFs.
pub const BUCKET: &str = "papers";

/// Lifetime of signed download URLs.
pub const SIGNED_URL_TTL_SECS: u64 = 24 * 3600;

/// Refresh this long before the access token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 30;

const SCHEMA_SQL: &str = r#"-- Run this in the backend's SQL editor
create table papers (
  id uuid primary key,
  user_id uuid references auth.users not null,
  title text,
  original_title text,
  source_url text,
  storage_path text,
  analysis jsonb,
  tags text[],
  status text,
  is_favorite boolean default false,
  user_notes text,
  created_at timestamptz default now(),
  updated_at timestamptz default now()
);
alter table papers enable row level security;
insert into storage.buckets (id, name, public) values ('papers', 'papers', false);

-- Policies (DB)
create policy "Users can manage their own papers" on papers for all using (auth.uid() = user_id);

-- Policies (Storage)
create policy "Users can upload pdfs" on storage.objects for insert with check ( bucket_id = 'papers' and auth.uid()::text = (storage.foldername(name))[1] );
create policy "Users can view pdfs" on storage.objects for select using ( bucket_id = 'papers' and auth.uid()::text = (storage.foldername(name))[1] );
create policy "Users can delete pdfs" on storage.objects for delete using ( bucket_id = 'papers' and auth.uid()::text = (storage.foldername(name))[1] );
"#;

/// SQL that creates the table, bucket and row-level policies the mirror expects.
pub fn schema_sql() -> &'static str {
    SCHEMA_SQL
}

// ── Auth types ───────────────────────────────────────────────────────────

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens of a signed-in user.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub user: CloudUser,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl Session {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_MARGIN_SECS <= now
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: CloudUser,
}

impl From<TokenResponse> for Session {
    fn from(t: TokenResponse) -> Self {
        let expires_at = t
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + t.expires_in.unwrap_or(3600));
        Session {
            access_token: t.access_token,
            refresh_token: t.refresh_token,
            expires_at,
            user: t.user,
        }
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

/// Shape of a row in the `papers` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperRow {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub analysis: Option<Value>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<DocumentStatus>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub user_notes: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl PaperRow {
    /// Row for `doc` owned by `user_id`. The title column carries the
    /// analysed title when there is one.
    pub fn from_document(doc: &Document, user_id: &str) -> Result<Self> {
        Ok(Self {
            id: doc.id.clone(),
            user_id: Some(user_id.to_string()),
            title: Some(doc.display_title().to_string()),
            original_title: Some(doc.original_title.clone()),
            source_url: doc.source_url.clone(),
            storage_path: doc.storage_path.clone(),
            analysis: doc.analysis.as_ref().map(serde_json::to_value).transpose()?,
            tags: Some(doc.tags.clone()),
            status: Some(doc.status),
            is_favorite: Some(doc.is_favorite),
            user_notes: Some(doc.user_notes.clone()),
            created_at: Some(doc.date_added),
        })
    }

    /// Local record for a fetched row. Cached bytes, extracted text and
    /// collection membership never leave the device, so they start empty.
    pub fn into_document(self) -> Document {
        let analysis = self.analysis.filter(|v| !v.is_null()).and_then(|v| {
            serde_json::from_value::<Analysis>(v)
                .map_err(|e| warn!("Ignoring unreadable analysis on row {}: {}", self.id, e))
                .ok()
        });
        let mut doc = Document::new(
            self.original_title
                .or(self.title)
                .unwrap_or_default(),
        );
        doc.id = self.id;
        doc.date_added = self.created_at.unwrap_or_else(Utc::now);
        doc.status = self.status.unwrap_or_default();
        doc.analysis = analysis;
        doc.tags = self.tags.unwrap_or_default();
        doc.user_notes = self.user_notes.unwrap_or_default();
        doc.is_favorite = self.is_favorite.unwrap_or(false);
        doc.source_url = self.source_url;
        doc.storage_path = self.storage_path;
        doc.settle_status();
        doc
    }
}

// ── Error mapping ────────────────────────────────────────────────────────

/// Translate a backend error response into a [`PaperError`].
pub fn map_error(status: u16, body: &str) -> PaperError {
    let v: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let code = v.get("code").and_then(Value::as_str).unwrap_or_default();
    let message = ["message", "msg", "error_description", "error"]
        .iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| {
            let text = body.trim();
            if text.is_empty() {
                format!("HTTP {status}")
            } else {
                text.to_string()
            }
        });

    if code == "42P01"
        || code == "PGRST200"
        || message.contains("schema cache")
        || message.contains("Could not find the table")
    {
        PaperError::CloudSchemaMissing
    } else if code == "42501" {
        PaperError::CloudPermissionDenied
    } else if code == "22P02" && message.contains("uuid") {
        PaperError::CloudInvalidIdentifier
    } else {
        PaperError::Cloud { message }
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// REST client for one backend project.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    session: Mutex<Option<Session>>,
    /// Held while a refresh grant is in flight.
    refreshing: tokio::sync::Mutex<()>,
    kv: Option<Arc<KvStore>>,
}

impl std::fmt::Debug for CloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CloudClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        if config.url.trim().is_empty() || config.anon_key.trim().is_empty() {
            return Err(PaperError::InvalidConfig(
                "cloud sync needs both a project URL and an anon key".into(),
            ));
        }
        Ok(Self {
            http: crate::providers::http_client()?,
            base_url: config.normalized_url(),
            anon_key: config.anon_key.trim().to_string(),
            session: Mutex::new(None),
            refreshing: tokio::sync::Mutex::new(()),
            kv: None,
        })
    }

    /// Persist the session in `kv`, resuming one that is already stored.
    pub fn with_session_store(mut self, kv: Arc<KvStore>) -> Self {
        match kv.get_json::<Session>(SESSION_KEY) {
            Ok(Some(s)) => {
                debug!("Resuming cloud session for {}", s.user.id);
                if let Ok(mut guard) = self.session.lock() {
                    *guard = Some(s);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Ignoring unreadable cloud session: {}", e),
        }
        self.kv = Some(kv);
        self
    }

    /// Current session, if signed in.
    pub fn session(&self) -> Option<Session> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn store_session(&self, session: Option<Session>) -> Result<()> {
        if let Some(kv) = &self.kv {
            match &session {
                Some(s) => kv.set_json(SESSION_KEY, s)?,
                None => kv.remove(SESSION_KEY)?,
            }
        }
        let mut guard = self
            .session
            .lock()
            .map_err(|_| PaperError::Internal("cloud session lock poisoned".into()))?;
        *guard = session;
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .header("apikey", &self.anon_key)
            .send()
            .await
            .map_err(|e| PaperError::Cloud {
                message: e.to_string(),
            })?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        debug!("cloud: HTTP {} {}", status, body);
        Err(map_error(status, &body))
    }

    async fn token_grant(&self, grant: &str, body: Value) -> Result<Session> {
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("/auth/v1/token?grant_type={grant}")))
                    .json(&body),
            )
            .await?;
        let token: TokenResponse = response.json().await.map_err(|e| PaperError::Cloud {
            message: format!("unexpected auth response: {e}"),
        })?;
        let session = Session::from(token);
        self.store_session(Some(session.clone()))?;
        Ok(session)
    }

    /// Password sign-in.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        info!("Signed in to cloud as {}", email);
        Ok(session)
    }

    /// Create an account. Returns a session when the project does not
    /// require e-mail confirmation, `None` when it does.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>> {
        let response = self
            .send(
                self.http
                    .post(self.url("/auth/v1/signup"))
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        let body: Value = response.json().await.map_err(|e| PaperError::Cloud {
            message: format!("unexpected sign-up response: {e}"),
        })?;
        if body.get("access_token").is_none() {
            info!("Account {} created; confirmation pending", email);
            return Ok(None);
        }
        let token: TokenResponse = serde_json::from_value(body)?;
        let session = Session::from(token);
        self.store_session(Some(session.clone()))?;
        Ok(Some(session))
    }

    /// Exchange the refresh token for a new session.
    pub async fn refresh(&self) -> Result<Session> {
        let current = self.session().ok_or(PaperError::CloudNotAuthenticated)?;
        debug!("Refreshing cloud session for {}", current.user.id);
        self.token_grant("refresh_token", json!({ "refresh_token": current.refresh_token }))
            .await
    }

    /// Valid session, refreshed when it is about to expire.
    ///
    /// Concurrent callers with an expired session wait for one refresh and
    /// share its result; a refresh token is only ever spent once.
    async fn access(&self) -> Result<Session> {
        let session = self.session().ok_or(PaperError::CloudNotAuthenticated)?;
        if !session.is_expired(Utc::now().timestamp()) {
            return Ok(session);
        }
        let _refreshing = self.refreshing.lock().await;
        let session = self.session().ok_or(PaperError::CloudNotAuthenticated)?;
        if !session.is_expired(Utc::now().timestamp()) {
            return Ok(session);
        }
        self.refresh().await
    }

    /// Ask the backend who the access token belongs to.
    pub async fn current_user(&self) -> Result<CloudUser> {
        let session = self.access().await?;
        let response = self
            .send(
                self.http
                    .get(self.url("/auth/v1/user"))
                    .bearer_auth(&session.access_token),
            )
            .await?;
        response.json().await.map_err(|e| PaperError::Cloud {
            message: format!("unexpected user response: {e}"),
        })
    }

    /// Revoke the session on the backend (best effort) and forget it locally.
    pub async fn sign_out(&self) -> Result<()> {
        if let Some(session) = self.session() {
            let logout = self
                .http
                .post(self.url("/auth/v1/logout"))
                .bearer_auth(&session.access_token);
            if let Err(e) = self.send(logout).await {
                warn!("Cloud logout failed: {}", e);
            }
        }
        self.store_session(None)
    }

    /// Insert or replace the row for `doc`.
    pub async fn upsert_document(&self, doc: &Document) -> Result<()> {
        let session = self.access().await?;
        let row = PaperRow::from_document(doc, &session.user.id)?;
        self.send(
            self.http
                .post(self.url(&format!("/rest/v1/{TABLE}")))
                .bearer_auth(&session.access_token)
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&row),
        )
        .await?;
        debug!("Mirrored document {} ({})", doc.id, doc.status);
        Ok(())
    }

    /// All rows visible to the user, newest first.
    pub async fn fetch_documents(&self) -> Result<Vec<Document>> {
        let session = self.access().await?;
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("/rest/v1/{TABLE}?select=*&order=created_at.desc")))
                    .bearer_auth(&session.access_token),
            )
            .await?;
        let rows: Vec<PaperRow> = response.json().await.map_err(|e| PaperError::Cloud {
            message: format!("unexpected rows: {e}"),
        })?;
        Ok(rows.into_iter().map(PaperRow::into_document).collect())
    }

    /// Delete the row, then (best effort) its stored PDF.
    pub async fn delete_document(&self, id: &str, storage_path: Option<&str>) -> Result<()> {
        let session = self.access().await?;
        self.send(
            self.http
                .delete(self.url(&format!("/rest/v1/{TABLE}?id=eq.{id}")))
                .bearer_auth(&session.access_token),
        )
        .await?;
        if let Some(path) = storage_path {
            if let Err(e) = self.remove_objects(&[path.to_string()]).await {
                warn!("Error deleting stored file {}: {}", path, e);
            }
        }
        Ok(())
    }

    /// Upload a PDF under the user's folder; returns the object path.
    pub async fn upload_pdf(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let session = self.access().await?;
        let path = object_path(&session.user.id, file_name, Utc::now().timestamp_millis());
        self.send(
            self.http
                .post(self.url(&format!("/storage/v1/object/{BUCKET}/{path}")))
                .bearer_auth(&session.access_token)
                .header("content-type", "application/pdf")
                .header("cache-control", "max-age=3600")
                .header("x-upsert", "false")
                .body(bytes),
        )
        .await?;
        info!("Uploaded {} to {}", file_name, path);
        Ok(path)
    }

    /// Time-limited download URL for a stored object.
    pub async fn signed_url(&self, path: &str) -> Result<String> {
        #[derive(Deserialize)]
        struct Signed {
            #[serde(rename = "signedURL", alias = "signedUrl")]
            signed_url: String,
        }

        let session = self.access().await?;
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("/storage/v1/object/sign/{BUCKET}/{path}")))
                    .bearer_auth(&session.access_token)
                    .json(&json!({ "expiresIn": SIGNED_URL_TTL_SECS })),
            )
            .await?;
        let signed: Signed = response.json().await.map_err(|e| PaperError::Cloud {
            message: format!("unexpected signed URL response: {e}"),
        })?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }

    /// Delete stored objects by path.
    pub async fn remove_objects(&self, paths: &[String]) -> Result<()> {
        let session = self.access().await?;
        self.send(
            self.http
                .delete(self.url(&format!("/storage/v1/object/{BUCKET}")))
                .bearer_auth(&session.access_token)
                .json(&json!({ "prefixes": paths })),
        )
        .await?;
        Ok(())
    }
}

/// `<user_id>/<millis>_<random>.<ext>`
fn object_path(user_id: &str, file_name: &str, millis: i64) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}/{}_{}.{}", user_id, millis, &random[..7], extension(file_name))
}
