//! PDF text extraction built on `lopdf`.
//!
//! Two consumers with different needs share this module: the upload preview
//! wants the first few pages, and the summarization path wants the whole
//! document as one plain-text block. Both read from in-memory bytes; the
//! chunked parse used for retrieval goes through the hosted parse service
//! instead and never touches this code.

use lopdf::Document;
use thiserror::Error;

/// Number of leading pages included in the upload preview.
pub const PREVIEW_PAGE_LIMIT: usize = 3;

/// Errors raised while extracting text from a PDF.
#[derive(Debug, Error)]
pub enum PdfError {
    /// The byte stream could not be parsed as a PDF document.
    #[error("Failed to load PDF: {0}")]
    Load(String),
    /// The document is encrypted and cannot be read without a password.
    #[error("PDF is encrypted")]
    Encrypted,
    /// A page's content stream could not be decoded into text.
    #[error("Failed to extract text from page {page}: {message}")]
    Extraction {
        /// 1-indexed page number that failed to decode.
        page: u32,
        /// Underlying decoder error.
        message: String,
    },
}

/// Extract the text of every page, in page order.
pub fn page_texts(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    let doc = Document::load_mem(bytes).map_err(|err| PdfError::Load(err.to_string()))?;
    if doc.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    let mut pages = Vec::new();
    for (page_number, _object_id) in doc.get_pages() {
        let text = doc
            .extract_text(&[page_number])
            .map_err(|err| PdfError::Extraction {
                page: page_number,
                message: err.to_string(),
            })?;
        pages.push(text);
    }
    Ok(pages)
}

/// Concatenated text of the first [`PREVIEW_PAGE_LIMIT`] pages.
pub fn preview_text(bytes: &[u8]) -> Result<String, PdfError> {
    let pages = page_texts(bytes)?;
    Ok(join_pages(pages.iter().take(PREVIEW_PAGE_LIMIT)))
}

/// Full plain text of the document, pages concatenated in order.
///
/// This feeds the summarization prompt; callers are expected to apply their
/// own length budget afterwards.
pub fn full_text(bytes: &[u8]) -> Result<String, PdfError> {
    let pages = page_texts(bytes)?;
    Ok(join_pages(pages.iter()))
}

fn join_pages<'a>(pages: impl Iterator<Item = &'a String>) -> String {
    let mut text = String::new();
    for page in pages {
        let trimmed = page.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        text.push_str(trimmed);
        text.push('\n');
    }
    text
}
