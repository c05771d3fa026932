use image::DynamicImage;
use lopdf::{Document, ObjectId};

use bookdiff_core::{BackendError, PdfBackend, PdfPages};

mod filters;
mod xobject;

pub use xobject::decode_image;

/// lopdf-based implementation of [`PdfBackend`], used as the fallback library.
///
/// Text comes from lopdf's content-stream text extraction. For pages without
/// a text layer, every raster image XObject on the page is decoded, in the
/// order the page's `/XObject` resources list them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfBackend;

impl LopdfBackend {
    pub fn new() -> Self {
        Self
    }
}

impl PdfBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfPages>, BackendError> {
        let document =
            Document::load_mem(data).map_err(|e| BackendError::OpenError(e.to_string()))?;
        // get_pages returns BTreeMap<u32, ObjectId> with 1-based keys, in page order
        let pages: Vec<(u32, ObjectId)> = document.get_pages().into_iter().collect();
        tracing::debug!(pages = pages.len(), "lopdf opened document");
        Ok(Box::new(LopdfDocument { document, pages }))
    }
}

struct LopdfDocument {
    document: Document,
    pages: Vec<(u32, ObjectId)>,
}

impl LopdfDocument {
    fn page(&self, index: usize) -> Result<(u32, ObjectId), BackendError> {
        self.pages.get(index).copied().ok_or_else(|| {
            BackendError::ExtractionError(format!(
                "page index {index} out of range ({} pages)",
                self.pages.len()
            ))
        })
    }
}

impl PdfPages for LopdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, BackendError> {
        let (number, _) = self.page(index)?;
        self.document
            .extract_text(&[number])
            .map_err(|e| BackendError::ExtractionError(format!("page {number}: {e}")))
    }

    fn page_images(&self, index: usize) -> Result<Vec<DynamicImage>, BackendError> {
        let (number, page_id) = self.page(index)?;
        let streams = xobject::page_image_streams(&self.document, page_id)?;
        tracing::debug!(page = number, images = streams.len(), "decoding embedded images");

        streams
            .into_iter()
            .map(|(name, stream)| {
                decode_image(&self.document, stream).map_err(|e| match e {
                    BackendError::ImageError(msg) => {
                        BackendError::ImageError(format!("/{name} on page {number}: {msg}"))
                    }
                    other => other,
                })
            })
            .collect()
    }
}
