//! Text extraction from source documents.
//!
//! Extractors turn raw file bytes into plain text ready for chunking. PDFs are
//! read page by page with `lopdf`; every page that yields text is prefixed with a
//! `--- Page N ---` marker so chunks keep a hint of where they came from. Pages
//! that fail to decode are skipped with a warning rather than failing the whole
//! document.

use lopdf::Document;
use std::path::{Path, PathBuf};

/// Why a document produced no text.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse PDF {path}: {message}")]
    Pdf { path: PathBuf, message: String },

    #[error("{path} is not valid UTF-8 text")]
    Encoding { path: PathBuf },

    #[error("unsupported document format: {path}")]
    UnsupportedFormat { path: PathBuf },
}

/// Converts document bytes to text. Implementations are synchronous and are
/// run on the blocking pool by the indexer.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// PDF text via lopdf.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl TextExtractor for PdfExtractor {
    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractionError> {
        let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Pdf {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let mut text = String::new();
        for page_number in doc.get_pages().keys().copied() {
            match doc.extract_text(&[page_number]) {
                Ok(page_text) if !page_text.trim().is_empty() => {
                    text.push_str(&format!("\n--- Page {page_number} ---\n"));
                    text.push_str(&page_text);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Could not extract text from page {} of {}: {}",
                        page_number,
                        path.display(),
                        e
                    );
                }
            }
        }

        Ok(text.trim().to_string())
    }
}

/// UTF-8 text files (plain text, Markdown).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractionError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::Encoding {
            path: path.to_path_buf(),
        })?;
        Ok(text.trim_start_matches('\u{feff}').trim().to_string())
    }
}

/// Picks an extractor from the file extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor {
    pdf: PdfExtractor,
    plain: PlainTextExtractor,
}

impl TextExtractor for DocumentExtractor {
    fn extract(&self, path: &Path, bytes: &[u8]) -> Result<String, ExtractionError> {
        match extension_of(path).as_deref() {
            Some("pdf") => self.pdf.extract(path, bytes),
            Some("txt" | "text" | "md" | "markdown") => self.plain.extract(path, bytes),
            _ => Err(ExtractionError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

/// Lowercased file extension.
pub(crate) fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}
