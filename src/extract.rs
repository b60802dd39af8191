//! Document loading and PDF text extraction.
//!
//! PDFs are converted page by page and the pages joined with a newline;
//! everything else is read as UTF-8 text. Extraction never panics: a broken
//! PDF is an [`ExtractError`] and the caller skips or fails that document.

use anyhow::{Context, Result};
use std::path::Path;
use thiserror::Error;

use crate::models::Document;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract text from PDF bytes, one page after another separated by `\n`.
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.join("\n"))
}

pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Load a document from disk, extracting text from PDFs.
pub fn load_document(path: &Path) -> Result<Document> {
    let text = if is_pdf(path) {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        pdf_to_text(&bytes).with_context(|| format!("Failed to extract {}", path.display()))?
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?
    };
    Ok(Document::new(path, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pdf_returns_error() {
        let result = pdf_to_text(b"not a pdf");
        assert!(matches!(result, Err(ExtractError::Pdf(_))));
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(is_pdf(Path::new("paper.PDF")));
        assert!(is_pdf(Path::new("dir/paper.pdf")));
        assert!(!is_pdf(Path::new("paper.txt")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn load_text_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.h");
        std::fs::write(&path, "int a;\n").unwrap();
        let doc = load_document(&path).unwrap();
        assert_eq!(doc.text, "int a;\n");
        assert_eq!(doc.source, path);
    }

    #[test]
    fn load_broken_pdf_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        assert!(load_document(&path).is_err());
    }

    #[test]
    fn load_non_utf8_text_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bin.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();
        assert!(load_document(&path).is_err());
    }
}
