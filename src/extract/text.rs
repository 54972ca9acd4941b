//! Document text extraction.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::ExtractionError;

/// Turns a stored document into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the document's text. Empty (whitespace-only) text is an error.
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError>;
}

/// PDF text extraction backed by lopdf.
///
/// Parsing is CPU-bound, so it runs on the blocking pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, ExtractionError> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || extract_pdf_file(&path))
            .await
            .map_err(|e| ExtractionError::Parse(format!("extraction task failed: {e}")))?
    }
}

fn extract_pdf_file(path: &Path) -> Result<String, ExtractionError> {
    let _span = tracing::info_span!("extract.pdf").entered();

    let bytes = std::fs::read(path).map_err(|e| ExtractionError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    let doc = lopdf::Document::load_mem(&bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let mut text = String::new();
    let mut pages = 0usize;
    for (page_num, _) in doc.get_pages() {
        pages += 1;
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => debug!(page = page_num, error = %e, "Skipping unreadable page"),
        }
    }

    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }

    debug!(pages, chars = text.len(), "Extracted PDF text");
    Ok(text)
}
