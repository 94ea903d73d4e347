//! Local persistence: a single SQLite key/value table plus JSON file export.
//!
//! The library snapshot and the cloud session are stored as JSON text under
//! fixed keys in one two-column table.

use crate::error::{PaperError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Key of the persisted library snapshot.
pub const LIBRARY_KEY: &str = "paperlens-library-v2";

/// Key of the persisted cloud auth session.
pub const SESSION_KEY: &str = "paperlens-cloud-session";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);";

/// SQLite-backed string map.
pub struct KvStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").field("path", &self.path).finish()
    }
}

impl KvStore {
    /// Open (creating if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| PaperError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        debug!("Opened library database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Database that lives only as long as the store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// `<data dir>/paperlens/library.db`.
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|d| d.join("paperlens").join("library.db"))
            .ok_or_else(|| PaperError::Persistence("no data directory for this platform".into()))
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| PaperError::Persistence("database lock poisoned".into()))?;
        Ok(f(&conn)?)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|c| {
            c.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|c| {
            c.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
        })?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|c| c.execute("DELETE FROM kv WHERE key = ?1", params![key]))?;
        Ok(())
    }

    /// Decode the JSON value under `key`.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, &serde_json::to_string(value)?)
    }
}

/// Write `value` as pretty JSON to `path` through a temp file in the same
/// directory, so a crash never leaves a half-written export behind.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let io_err = |e: std::io::Error| PaperError::Io {
        path: path.to_path_buf(),
        source: e,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n").map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

/// Read a JSON file into a loosely typed value for migration.
pub fn read_json_value(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PaperError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PaperError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    })?;
    Ok(serde_json::from_str(&text)?)
}
