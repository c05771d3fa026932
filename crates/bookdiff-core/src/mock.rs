//! Hand-rolled mocks for the extraction and chat seams.
//!
//! Scanned content is modelled by [`text_image`]: the text's bytes become the
//! pixels of a one-row grayscale bitmap, and [`MockOcr`] reads them back. That
//! keeps OCR deterministic without a real engine.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, GrayImage};

use crate::backend::{BackendError, PdfBackend, PdfPages};
use crate::chat::{ChatClient, ChatError, ChatMessage};
use crate::ocr::{OcrEngine, OcrError};

/// Encode `text` as a bitmap that [`MockOcr`] recognizes as `text`.
pub fn text_image(text: &str) -> DynamicImage {
    let mut pixels = text.as_bytes().to_vec();
    if pixels.is_empty() {
        pixels.push(0);
    }
    let width = pixels.len() as u32;
    let bitmap = GrayImage::from_raw(width, 1, pixels).unwrap_or_else(|| GrayImage::new(1, 1));
    DynamicImage::ImageLuma8(bitmap)
}

/// One scripted page of a [`MockBackend`] document.
#[derive(Clone, Debug, Default)]
pub struct MockPage {
    pub text: String,
    /// Text printed on each image of the page, in order.
    pub images: Vec<String>,
    /// If set, reading this page fails with this message.
    pub error: Option<String>,
}

impl MockPage {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// A page with an empty text layer and one image per entry.
    pub fn scanned(images: &[&str]) -> Self {
        Self {
            images: images.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn broken(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_images(mut self, images: &[&str]) -> Self {
        self.images = images.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A [`PdfBackend`] that ignores the input bytes and serves scripted pages.
pub struct MockBackend {
    name: &'static str,
    pages: Vec<MockPage>,
    open_error: Option<String>,
    open_count: AtomicUsize,
}

impl MockBackend {
    pub fn new(name: &'static str, pages: Vec<MockPage>) -> Self {
        Self {
            name,
            pages,
            open_error: None,
            open_count: AtomicUsize::new(0),
        }
    }

    /// A backend whose `open` always fails.
    pub fn unreadable(name: &'static str, message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::new(name, Vec::new())
        }
    }

    /// How many times `open()` has been called.
    pub fn open_count(&self) -> usize {
        self.open_count.load(Ordering::SeqCst)
    }
}

impl PdfBackend for MockBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn open(&self, _data: &[u8]) -> Result<Box<dyn PdfPages>, BackendError> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.open_error {
            return Err(BackendError::OpenError(message.clone()));
        }
        Ok(Box::new(MockDocument {
            pages: self.pages.clone(),
        }))
    }
}

struct MockDocument {
    pages: Vec<MockPage>,
}

impl MockDocument {
    fn page(&self, index: usize) -> Result<&MockPage, BackendError> {
        let page = self
            .pages
            .get(index)
            .ok_or_else(|| BackendError::ExtractionError(format!("no page {index}")))?;
        match page.error {
            Some(ref message) => Err(BackendError::ExtractionError(message.clone())),
            None => Ok(page),
        }
    }
}

impl PdfPages for MockDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&self, index: usize) -> Result<String, BackendError> {
        Ok(self.page(index)?.text.clone())
    }

    fn page_images(&self, index: usize) -> Result<Vec<DynamicImage>, BackendError> {
        Ok(self.page(index)?.images.iter().map(|t| text_image(t)).collect())
    }
}

/// An [`OcrEngine`] that reads back bitmaps produced by [`text_image`].
#[derive(Default)]
pub struct MockOcr {
    error: Option<String>,
    call_count: AtomicUsize,
}

impl MockOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(message: &str) -> Self {
        Self {
            error: Some(message.to_string()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// How many times `recognize()` has been called.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.error {
            return Err(OcrError::Failed(message.clone()));
        }
        let mut bytes = image.to_luma8().into_raw();
        bytes.retain(|&b| b != 0);
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// A configurable reply for [`MockChat`].
#[derive(Clone, Debug)]
pub enum MockReply {
    Text(String),
    /// Echo the prompt back, prefixed with the number of history messages.
    Echo,
    RateLimited,
    Error(String),
}

/// A [`ChatClient`] that replays scripted replies and records every request.
pub struct MockChat {
    /// Replies in reverse order so `pop()` yields the next one.
    replies: Mutex<Vec<MockReply>>,
    fallback: MockReply,
    requests: Mutex<Vec<(usize, String)>>,
}

impl MockChat {
    /// Always answer with `reply`.
    pub fn new(reply: MockReply) -> Self {
        Self {
            replies: Mutex::new(Vec::new()),
            fallback: reply,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `replies` in order, then keep repeating the last one.
    pub fn with_sequence(mut replies: Vec<MockReply>) -> Self {
        let fallback = replies.last().cloned().unwrap_or(MockReply::Echo);
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            fallback,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `(history length, prompt)` of every request so far.
    pub fn requests(&self) -> Vec<(usize, String)> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .ok()
            .and_then(|mut seq| seq.pop())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl ChatClient for MockChat {
    fn name(&self) -> &str {
        "mock"
    }

    fn send<'a>(
        &'a self,
        history: &'a [ChatMessage],
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ChatError>> + Send + 'a>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((history.len(), prompt.to_string()));
        }
        let reply = self.next_reply();

        Box::pin(async move {
            match reply {
                MockReply::Text(text) => Ok(text),
                MockReply::Echo => Ok(format!("[{}] {}", history.len(), prompt)),
                MockReply::RateLimited => Err(ChatError::RateLimited),
                MockReply::Error(message) => Err(ChatError::Api(message)),
            }
        })
    }
}
