//! JSON persistence for extracted documents.
//!
//! Each uploaded document is written as `{data_dir}/{doc_id}.json` holding
//! the [`DocumentRecord`] (metadata plus full extracted text). This is a
//! best-effort cache for direct-mode chat and restarts, not a durable
//! database.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::models::DocumentRecord;

/// Filesystem-backed document store rooted at a data directory.
pub struct DocumentStore {
    data_dir: PathBuf,
}

/// Load error distinguishing "no such document" from real I/O failures.
#[derive(Debug)]
pub enum StoreError {
    NotFound(String),
    Io(anyhow::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound(id) => write!(f, "document not found: {}", id),
            StoreError::Io(e) => write!(f, "document store error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl DocumentStore {
    /// Opens a store rooted at `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data dir: {}", data_dir.display()))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    fn record_path(&self, doc_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", doc_id))
    }

    /// Persists a document record, overwriting any previous one.
    pub fn persist(&self, record: &DocumentRecord) -> Result<()> {
        let path = self.record_path(&record.doc_id);
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write document record: {}", path.display()))?;
        debug!(doc_id = %record.doc_id, path = %path.display(), "persisted document record");
        Ok(())
    }

    /// Loads a document record by id.
    pub fn load(&self, doc_id: &str) -> Result<DocumentRecord, StoreError> {
        let path = self.record_path(doc_id);
        if !path.exists() {
            return Err(StoreError::NotFound(doc_id.to_string()));
        }
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document record: {}", path.display()))
            .map_err(StoreError::Io)?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt document record: {}", path.display()))
            .map_err(StoreError::Io)
    }
}
