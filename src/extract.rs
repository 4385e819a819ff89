//! PDF text extraction collaborator.
//!
//! Turns uploaded PDF bytes into a page count plus plain UTF-8 text.
//! Parsing failures come back as [`ExtractError::InvalidDocument`] and the
//! pipeline rejects the upload; this module never panics on malformed input.

use tracing::debug;

/// Page count and extracted text for one uploaded PDF.
#[derive(Debug, Clone)]
pub struct ExtractedPdf {
    pub pages: usize,
    pub text: String,
}

/// Extraction error: the bytes are not a readable PDF.
#[derive(Debug)]
pub enum ExtractError {
    InvalidDocument(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::InvalidDocument(e) => {
                write!(f, "invalid or corrupted PDF: {}", e)
            }
        }
    }
}

impl std::error::Error for ExtractError {}

/// Extracts the page count and text content from PDF bytes.
pub fn extract_pdf(bytes: &[u8]) -> Result<ExtractedPdf, ExtractError> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::InvalidDocument(e.to_string()))?;
    let pages = document.get_pages().len();

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ExtractError::InvalidDocument(e.to_string()))?;
    let text = text.trim().to_string();

    debug!(pages, chars = text.len(), "extracted PDF text");
    Ok(ExtractedPdf { pages, text })
}
