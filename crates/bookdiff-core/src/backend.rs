use image::DynamicImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to open PDF: {0}")]
    OpenError(String),
    #[error("failed to extract text: {0}")]
    ExtractionError(String),
    #[error("failed to decode image: {0}")]
    ImageError(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for PDF libraries the extractor can drive.
///
/// Implementors only expose pages; the primary/fallback orchestration and the
/// OCR substitution for empty pages live in
/// [`crate::extractor::PdfTextExtractor`].
pub trait PdfBackend: Send + Sync {
    /// Short library name used in log lines.
    fn name(&self) -> &'static str;

    /// Parse a complete PDF held in memory.
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfPages>, BackendError>;
}

/// An opened document, indexed by zero-based page number in physical order.
pub trait PdfPages {
    fn page_count(&self) -> usize;

    /// The page's text layer. An empty string means the page has none.
    fn page_text(&self, index: usize) -> Result<String, BackendError>;

    /// Bitmaps to run OCR over when the page has no text layer.
    ///
    /// What a "page image" is depends on the library: a rasterization of the
    /// whole page, or the raster images embedded in it.
    fn page_images(&self, index: usize) -> Result<Vec<DynamicImage>, BackendError>;
}
