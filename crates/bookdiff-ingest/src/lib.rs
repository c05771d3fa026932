use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use bookdiff_core::{
    Config, DocumentOutcome, PdfBackend, PdfTextExtractor, RecursiveCharacterSplitter, Textbook,
};
use bookdiff_ocr::TesseractOcr;
use bookdiff_pdf_lopdf::LopdfBackend;

// Re-export domain types for convenience
pub use bookdiff_core::UploadedDocument;

/// Readers are allowed to find the header anywhere in the first kilobyte.
const HEADER_WINDOW: usize = 1024;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether `data` carries a `%PDF-` header.
pub fn is_pdf(data: &[u8]) -> bool {
    data[..data.len().min(HEADER_WINDOW)]
        .windows(5)
        .any(|w| w == b"%PDF-")
}

/// The extractor used in production: MuPDF first, lopdf as the fallback,
/// Tesseract for pages without a text layer.
///
/// Without the `mupdf` feature, lopdf serves as both primary and fallback.
pub fn default_extractor(config: &Config) -> PdfTextExtractor {
    let ocr = TesseractOcr::new(&config.tesseract_path, &config.ocr_language);
    if !ocr.is_available() {
        tracing::warn!(
            program = %config.tesseract_path.display(),
            "tesseract is not available; pages without a text layer will fail"
        );
    }
    PdfTextExtractor::new(primary_backend(config), Arc::new(LopdfBackend::new()), Arc::new(ocr))
}

#[cfg(feature = "mupdf")]
fn primary_backend(config: &Config) -> Arc<dyn PdfBackend> {
    Arc::new(
        bookdiff_pdf_mupdf::MupdfBackend::new()
            .with_render_dpi(config.render_dpi)
            .with_header_exclusion(config.header_exclusion)
            .with_footer_exclusion(config.footer_exclusion),
    )
}

#[cfg(not(feature = "mupdf"))]
fn primary_backend(_config: &Config) -> Arc<dyn PdfBackend> {
    tracing::debug!("built without mupdf; lopdf is the primary backend");
    Arc::new(LopdfBackend::new())
}

/// Read a file from disk, named by its file name.
pub fn load_document(path: &Path) -> Result<UploadedDocument, IngestError> {
    let data = std::fs::read(path).map_err(|source| IngestError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(UploadedDocument::new(document_name(path), data))
}

fn document_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Extract and chunk one document. Never fails: problems become
/// [`DocumentOutcome::Failed`] or [`DocumentOutcome::Empty`].
pub fn extract_document(
    extractor: &PdfTextExtractor,
    splitter: &RecursiveCharacterSplitter,
    doc: &UploadedDocument,
) -> DocumentOutcome {
    if !is_pdf(&doc.data) {
        tracing::warn!(file = %doc.name, "not a PDF file");
        return DocumentOutcome::Failed {
            name: doc.name.clone(),
            error: "not a PDF file".to_string(),
        };
    }

    match extractor.extract(&doc.data) {
        Ok(text) if text.trim().is_empty() => {
            tracing::warn!(file = %doc.name, "no text extracted");
            DocumentOutcome::Empty {
                name: doc.name.clone(),
            }
        }
        Ok(text) => {
            let book = Textbook::new(doc.name.clone(), text, splitter);
            tracing::info!(
                file = %book.name,
                chars = book.text.chars().count(),
                chunks = book.chunks.len(),
                "document extracted"
            );
            DocumentOutcome::Extracted(book)
        }
        Err(e) => {
            tracing::warn!(file = %doc.name, error = %e, "extraction failed");
            DocumentOutcome::Failed {
                name: doc.name.clone(),
                error: e.to_string(),
            }
        }
    }
}

/// Extract every document in order. One document failing never stops the
/// others.
pub fn extract_documents(
    extractor: &PdfTextExtractor,
    splitter: &RecursiveCharacterSplitter,
    docs: &[UploadedDocument],
) -> Vec<DocumentOutcome> {
    extract_documents_with_progress(extractor, splitter, docs, |_, _| {})
}

/// Like [`extract_documents`], calling `on_start(index, name)` before each
/// document.
pub fn extract_documents_with_progress(
    extractor: &PdfTextExtractor,
    splitter: &RecursiveCharacterSplitter,
    docs: &[UploadedDocument],
    mut on_start: impl FnMut(usize, &str),
) -> Vec<DocumentOutcome> {
    docs.iter()
        .enumerate()
        .map(|(i, doc)| {
            on_start(i, &doc.name);
            extract_document(extractor, splitter, doc)
        })
        .collect()
}

/// Read and extract every file in order. A file that cannot be read becomes
/// [`DocumentOutcome::Failed`] like any other document problem.
pub fn extract_paths(
    extractor: &PdfTextExtractor,
    splitter: &RecursiveCharacterSplitter,
    paths: &[PathBuf],
) -> Vec<DocumentOutcome> {
    extract_paths_with_progress(extractor, splitter, paths, |_, _| {})
}

/// Like [`extract_paths`], calling `on_start(index, name)` before each file.
pub fn extract_paths_with_progress(
    extractor: &PdfTextExtractor,
    splitter: &RecursiveCharacterSplitter,
    paths: &[PathBuf],
    mut on_start: impl FnMut(usize, &str),
) -> Vec<DocumentOutcome> {
    paths
        .iter()
        .enumerate()
        .map(|(i, path)| {
            let name = document_name(path);
            on_start(i, &name);
            match load_document(path) {
                Ok(doc) => extract_document(extractor, splitter, &doc),
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "could not read file");
                    DocumentOutcome::Failed {
                        name,
                        error: e.to_string(),
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_header_detection() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_pdf(b"\xEF\xBB\xBF%PDF-1.4"));
        assert!(!is_pdf(b"PK\x03\x04 zip archive"));
        assert!(!is_pdf(b""));

        let mut late = vec![b' '; HEADER_WINDOW];
        late.extend_from_slice(b"%PDF-1.7");
        assert!(!is_pdf(&late));
    }

    #[test]
    fn default_extractor_builds_without_tesseract() {
        let config = Config {
            tesseract_path: PathBuf::from("/nonexistent/tesseract"),
            ..Default::default()
        };
        // Construction only warns; OCR errors surface per page at extraction time.
        let _ = default_extractor(&config);
    }
}
