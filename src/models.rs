//! Core data models for the upload and chat pipeline.
//!
//! These types represent the documents, chunks, and responses that flow
//! through admission control, extraction, and retrieval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Extracted document record persisted as JSON in the data directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub filename: String,
    /// Uploaded file size in bytes.
    pub size: usize,
    pub pages: usize,
    /// Full extracted text, retained for direct-mode chat.
    pub text: String,
    /// SHA-256 of the uploaded bytes.
    pub sha256: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of a successful upload, returned to the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub doc_id: String,
    pub filename: String,
    pub size: usize,
    pub pages: usize,
    pub chunk_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of a chat request: the upstream model's text, verbatim.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResult {
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

/// How chat context is assembled before prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatMode {
    /// Keyword-select the most relevant chunks, falling back to full text.
    #[default]
    Retrieval,
    /// Always send the full stored document text.
    Direct,
}
