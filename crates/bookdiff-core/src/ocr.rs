use image::DynamicImage;
use thiserror::Error;

/// Tesseract page segmentation mode 6: assume a single uniform block of text.
pub const UNIFORM_BLOCK_PSM: u8 = 6;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),
    #[error("OCR failed: {0}")]
    Failed(String),
    #[error("failed to encode image for OCR: {0}")]
    Encode(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text recognition over a decoded bitmap.
///
/// Engines always run in [`UNIFORM_BLOCK_PSM`] mode.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}
