use std::io::{Read, Seek};
use std::sync::Arc;

use thiserror::Error;

use crate::backend::{BackendError, PdfBackend};
use crate::ocr::{OcrEngine, OcrError};

/// Why a single pass over the document stopped.
#[derive(Error, Debug)]
pub enum PassError {
    #[error("could not open document: {0}")]
    Open(#[source] BackendError),
    #[error("page {page}: {source}")]
    Page {
        page: usize,
        #[source]
        source: BackendError,
    },
    #[error("page {page}: {source}")]
    Ocr {
        page: usize,
        #[source]
        source: OcrError,
    },
}

/// The primary library could not process the document. Recovered by
/// re-running the whole document through the fallback library.
#[derive(Error, Debug)]
#[error("{backend} extraction failed: {source}")]
pub struct PrimaryExtractionFailed {
    pub backend: &'static str,
    #[source]
    pub source: PassError,
}

/// The fallback library (or OCR during the fallback pass) failed. There is
/// no further fallback, so this reaches the caller.
#[derive(Error, Debug)]
#[error("{backend} fallback extraction failed: {source}")]
pub struct FallbackExtractionFailed {
    pub backend: &'static str,
    #[source]
    pub source: PassError,
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Fallback(#[from] FallbackExtractionFailed),
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
}

/// Best-effort plain text for a PDF, with OCR standing in for pages that
/// have no text layer.
///
/// Each pass walks pages in order. A page with a non-blank text layer
/// contributes that text verbatim; otherwise every image the backend reports
/// for the page is OCR'd and the results are appended in image order. Pages
/// are concatenated with no separator.
///
/// If anything goes wrong in the primary pass, its partial output is
/// discarded and the document is processed again from page 1 by the
/// fallback backend.
pub struct PdfTextExtractor {
    primary: Arc<dyn PdfBackend>,
    fallback: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrEngine>,
}

impl PdfTextExtractor {
    pub fn new(
        primary: Arc<dyn PdfBackend>,
        fallback: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrEngine>,
    ) -> Self {
        Self {
            primary,
            fallback,
            ocr,
        }
    }

    /// Extract from an in-memory document.
    pub fn extract(&self, data: &[u8]) -> Result<String, FallbackExtractionFailed> {
        match self.extract_primary(data) {
            Ok(text) => Ok(text),
            Err(err) => {
                tracing::warn!(error = %err, "primary extraction failed");
                tracing::info!(backend = self.fallback.name(), "falling back");
                self.extract_fallback(data)
            }
        }
    }

    /// Extract from a seekable stream.
    ///
    /// The stream is rewound before each pass, so it may already have been
    /// partially consumed by the caller.
    pub fn extract_from_reader<R: Read + Seek>(
        &self,
        reader: &mut R,
    ) -> Result<String, ExtractError> {
        let data = read_from_start(reader)?;
        match self.extract_primary(&data) {
            Ok(text) => return Ok(text),
            Err(err) => {
                tracing::warn!(error = %err, "primary extraction failed");
                tracing::info!(backend = self.fallback.name(), "falling back");
            }
        }
        drop(data);

        let data = read_from_start(reader)?;
        Ok(self.extract_fallback(&data)?)
    }

    pub fn extract_primary(&self, data: &[u8]) -> Result<String, PrimaryExtractionFailed> {
        let backend = self.primary.name();
        self.run_pass(self.primary.as_ref(), data)
            .map_err(|source| PrimaryExtractionFailed { backend, source })
    }

    pub fn extract_fallback(&self, data: &[u8]) -> Result<String, FallbackExtractionFailed> {
        let backend = self.fallback.name();
        self.run_pass(self.fallback.as_ref(), data)
            .map_err(|source| FallbackExtractionFailed { backend, source })
    }

    fn run_pass(&self, backend: &dyn PdfBackend, data: &[u8]) -> Result<String, PassError> {
        let document = backend.open(data).map_err(PassError::Open)?;
        let page_count = document.page_count();
        let mut text = String::new();
        let mut ocr_pages = 0usize;

        for index in 0..page_count {
            let page = index + 1;
            let layer = document
                .page_text(index)
                .map_err(|source| PassError::Page { page, source })?;

            if !layer.trim().is_empty() {
                text.push_str(&layer);
                continue;
            }

            let images = document
                .page_images(index)
                .map_err(|source| PassError::Page { page, source })?;
            tracing::debug!(
                backend = backend.name(),
                page,
                images = images.len(),
                "empty text layer, running OCR"
            );
            for image in &images {
                let recognized = self
                    .ocr
                    .recognize(image)
                    .map_err(|source| PassError::Ocr { page, source })?;
                text.push_str(&recognized);
            }
            ocr_pages += 1;
        }

        tracing::info!(
            backend = backend.name(),
            pages = page_count,
            ocr_pages,
            chars = text.chars().count(),
            "extraction pass complete"
        );
        Ok(text)
    }
}

fn read_from_start<R: Read + Seek>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    reader.rewind()?;
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data)
}
