use image::{DynamicImage, RgbImage};
use mupdf::{Colorspace, Document, Matrix, Page, TextPageFlags};

use bookdiff_core::{BackendError, PdfBackend, PdfPages};

/// PDF user space is 72 units per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// MuPDF-based implementation of [`PdfBackend`], used as the primary
/// "layout-aware" library.
///
/// This crate is the sole AGPL island: it isolates the mupdf dependency
/// (which is AGPL-3.0) so that the rest of the workspace does not
/// transitively depend on it.
///
/// Page text is read block by block, line by line. A page with no text layer
/// is rasterized at `render_dpi` and handed back as a single image for OCR.
pub struct MupdfBackend {
    render_dpi: f32,
    /// Fraction of page height from bottom to exclude as footer (0.0–1.0).
    /// `None` keeps everything.
    footer_exclusion_ratio: Option<f32>,
    /// Fraction of page height from top to exclude as header (0.0–1.0).
    /// `None` keeps everything.
    header_exclusion_ratio: Option<f32>,
}

impl Default for MupdfBackend {
    fn default() -> Self {
        Self {
            render_dpi: bookdiff_core::DEFAULT_RENDER_DPI,
            footer_exclusion_ratio: None,
            header_exclusion_ratio: None,
        }
    }
}

impl MupdfBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolution for page rasterization. Non-positive values are ignored.
    pub fn with_render_dpi(mut self, dpi: f32) -> Self {
        if dpi > 0.0 {
            self.render_dpi = dpi;
        }
        self
    }

    /// Set the footer exclusion ratio. Pass `0.0` to disable.
    pub fn with_footer_exclusion(mut self, ratio: f32) -> Self {
        self.footer_exclusion_ratio = if ratio > 0.0 { Some(ratio) } else { None };
        self
    }

    /// Set the header exclusion ratio. Pass `0.0` to disable.
    pub fn with_header_exclusion(mut self, ratio: f32) -> Self {
        self.header_exclusion_ratio = if ratio > 0.0 { Some(ratio) } else { None };
        self
    }
}

impl PdfBackend for MupdfBackend {
    fn name(&self) -> &'static str {
        "mupdf"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfPages>, BackendError> {
        let document = Document::from_bytes(data, "application/pdf")
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        let page_count = document
            .page_count()
            .map_err(|e| BackendError::OpenError(e.to_string()))?;
        tracing::debug!(pages = page_count, "mupdf opened document");

        Ok(Box::new(MupdfDocument {
            document,
            page_count: page_count.max(0) as usize,
            render_dpi: self.render_dpi,
            footer_exclusion_ratio: self.footer_exclusion_ratio,
            header_exclusion_ratio: self.header_exclusion_ratio,
        }))
    }
}

struct MupdfDocument {
    document: Document,
    page_count: usize,
    render_dpi: f32,
    footer_exclusion_ratio: Option<f32>,
    header_exclusion_ratio: Option<f32>,
}

impl MupdfDocument {
    fn load(&self, index: usize) -> Result<Page, BackendError> {
        self.document
            .load_page(index as i32)
            .map_err(|e| BackendError::ExtractionError(e.to_string()))
    }
}

fn extraction_error(e: mupdf::Error) -> BackendError {
    BackendError::ExtractionError(e.to_string())
}

impl PdfPages for MupdfDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_text(&self, index: usize) -> Result<String, BackendError> {
        let page = self.load(index)?;
        let text_page = page
            .to_text_page(TextPageFlags::empty())
            .map_err(extraction_error)?;

        let page_bounds = page.bounds().map_err(extraction_error)?;
        let page_height = page_bounds.y1 - page_bounds.y0;
        let header_threshold = self
            .header_exclusion_ratio
            .map(|r| page_bounds.y0 + page_height * r);
        let footer_threshold = self
            .footer_exclusion_ratio
            .map(|r| page_bounds.y1 - page_height * r);

        let mut page_text = String::new();
        for block in text_page.blocks() {
            let block_bounds = block.bounds();

            // Blocks entirely within the header band
            if let Some(threshold) = header_threshold {
                if block_bounds.y1 <= threshold {
                    continue;
                }
            }
            // Blocks starting inside the footer band
            if let Some(threshold) = footer_threshold {
                if block_bounds.y0 >= threshold {
                    continue;
                }
            }

            for line in block.lines() {
                page_text.extend(line.chars().map(|c| c.char().unwrap_or('\u{FFFD}')));
                page_text.push('\n');
            }
        }
        Ok(page_text)
    }

    fn page_images(&self, index: usize) -> Result<Vec<DynamicImage>, BackendError> {
        let page = self.load(index)?;
        let scale = self.render_dpi / POINTS_PER_INCH;
        let pixmap = page
            .to_pixmap(
                &Matrix::new_scale(scale, scale),
                &Colorspace::device_rgb(),
                false,
                false,
            )
            .map_err(|e| BackendError::ImageError(e.to_string()))?;

        let width = pixmap.width() as u32;
        let height = pixmap.height() as u32;
        let image = pixmap_to_rgb(pixmap.samples(), width, height, pixmap.n() as usize)?;
        tracing::debug!(page = index + 1, width, height, "rasterized page for OCR");
        Ok(vec![DynamicImage::ImageRgb8(image)])
    }
}

/// Copy pixmap samples into an RGB buffer, dropping any extra channels and
/// row padding.
fn pixmap_to_rgb(
    samples: &[u8],
    width: u32,
    height: u32,
    components: usize,
) -> Result<RgbImage, BackendError> {
    if width == 0 || height == 0 || components < 3 {
        return Err(BackendError::ImageError(format!(
            "unusable pixmap: {width}x{height}, {components} components"
        )));
    }
    let stride = samples.len() / height as usize;
    let row_bytes = width as usize * components;
    if stride < row_bytes {
        return Err(BackendError::ImageError(format!(
            "pixmap holds {} bytes, expected at least {}",
            samples.len(),
            row_bytes * height as usize
        )));
    }

    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    for row in samples.chunks_exact(stride).take(height as usize) {
        for pixel in row[..row_bytes].chunks_exact(components) {
            rgb.extend_from_slice(&pixel[..3]);
        }
    }
    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| BackendError::ImageError("pixmap size mismatch".into()))
}
