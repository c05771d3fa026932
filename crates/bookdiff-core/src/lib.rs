use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

pub mod backend;
pub mod chat;
pub mod chunking;
pub mod config_file;
pub mod conversation;
pub mod extractor;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod ocr;
pub mod prompts;
pub mod session;

// Re-export for convenience
pub use backend::{BackendError, PdfBackend, PdfPages};
pub use chat::{ChatClient, ChatError, ChatMessage, ChatRole, GeminiClient};
pub use chunking::{ChunkingError, RecursiveCharacterSplitter};
pub use conversation::{Conversation, Speaker, Transcript};
pub use extractor::{
    ExtractError, FallbackExtractionFailed, PassError, PdfTextExtractor, PrimaryExtractionFailed,
};
pub use ocr::{OcrEngine, OcrError};
pub use prompts::{PromptSet, PromptVariant};
pub use session::{Session, SessionError};

/// A PDF handed to the tool, by file name.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// A successfully extracted document, ready for prompting.
#[derive(Debug, Clone, Serialize)]
pub struct Textbook {
    pub name: String,
    pub text: String,
    /// Overlapping slices of `text`, used as context for follow-up questions.
    pub chunks: Vec<String>,
}

impl Textbook {
    pub fn new(
        name: impl Into<String>,
        text: impl Into<String>,
        splitter: &RecursiveCharacterSplitter,
    ) -> Self {
        let text = text.into();
        let chunks = splitter.split(&text);
        Self {
            name: name.into(),
            text,
            chunks,
        }
    }
}

/// Per-file result of batch ingestion.
#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Extracted(Textbook),
    /// Neither the text layer nor OCR produced any text.
    Empty { name: String },
    Failed { name: String, error: String },
}

impl DocumentOutcome {
    pub fn name(&self) -> &str {
        match self {
            DocumentOutcome::Extracted(book) => &book.name,
            DocumentOutcome::Empty { name } | DocumentOutcome::Failed { name, .. } => name,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, DocumentOutcome::Extracted(_))
    }
}

pub const DEFAULT_OCR_LANGUAGE: &str = "eng";
pub const DEFAULT_RENDER_DPI: f32 = 72.0;

/// Resolved runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub google_api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub temperature: Option<f32>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Tesseract executable; a bare name is looked up on `PATH`.
    pub tesseract_path: PathBuf,
    pub ocr_language: String,
    /// Resolution used when rasterizing pages for OCR.
    pub render_dpi: f32,
    /// Fraction of the page height at the top whose text is ignored. 0 disables.
    pub header_exclusion: f32,
    /// Fraction of the page height at the bottom whose text is ignored. 0 disables.
    pub footer_exclusion: f32,
    pub prompt_variant: PromptVariant,
    pub template_path: Option<PathBuf>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("google_api_key", &self.google_api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("tesseract_path", &self.tesseract_path)
            .field("ocr_language", &self.ocr_language)
            .field("render_dpi", &self.render_dpi)
            .field("header_exclusion", &self.header_exclusion)
            .field("footer_exclusion", &self.footer_exclusion)
            .field("prompt_variant", &self.prompt_variant)
            .field("template_path", &self.template_path)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_api_key: None,
            model: chat::gemini::DEFAULT_MODEL.to_string(),
            base_url: chat::gemini::DEFAULT_BASE_URL.to_string(),
            timeout_secs: chat::gemini::DEFAULT_TIMEOUT.as_secs(),
            temperature: None,
            chunk_size: chunking::DEFAULT_CHUNK_SIZE,
            chunk_overlap: chunking::DEFAULT_CHUNK_OVERLAP,
            tesseract_path: PathBuf::from("tesseract"),
            ocr_language: DEFAULT_OCR_LANGUAGE.to_string(),
            render_dpi: DEFAULT_RENDER_DPI,
            header_exclusion: 0.0,
            footer_exclusion: 0.0,
            prompt_variant: PromptVariant::default(),
            template_path: None,
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever the config file sets.
    pub fn from_config_file(file: &config_file::ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(ref keys) = file.api_keys {
            if keys.google_api_key.is_some() {
                config.google_api_key = keys.google_api_key.clone();
            }
        }
        if let Some(ref chat) = file.chat {
            if let Some(ref model) = chat.model {
                config.model = model.clone();
            }
            if let Some(ref url) = chat.base_url {
                config.base_url = url.clone();
            }
            if let Some(secs) = chat.timeout_secs {
                config.timeout_secs = secs;
            }
            if chat.temperature.is_some() {
                config.temperature = chat.temperature;
            }
        }
        if let Some(ref chunking) = file.chunking {
            if let Some(size) = chunking.chunk_size {
                config.chunk_size = size;
            }
            if let Some(overlap) = chunking.chunk_overlap {
                config.chunk_overlap = overlap;
            }
        }
        if let Some(ref extraction) = file.extraction {
            if let Some(ref path) = extraction.tesseract_path {
                config.tesseract_path = PathBuf::from(path);
            }
            if let Some(ref lang) = extraction.ocr_language {
                config.ocr_language = lang.clone();
            }
            if let Some(dpi) = extraction.render_dpi {
                config.render_dpi = dpi;
            }
            if let Some(ratio) = extraction.header_exclusion {
                config.header_exclusion = ratio;
            }
            if let Some(ratio) = extraction.footer_exclusion {
                config.footer_exclusion = ratio;
            }
        }
        if let Some(ref prompt) = file.prompt {
            if let Some(variant) = prompt.variant {
                config.prompt_variant = variant;
            }
            if let Some(ref path) = prompt.template_path {
                config.template_path = Some(PathBuf::from(path));
            }
        }
        config
    }

    /// These settings as a config file. The API key is never written.
    pub fn to_config_file(&self) -> config_file::ConfigFile {
        use config_file::*;

        ConfigFile {
            api_keys: None,
            chat: Some(ChatConfig {
                model: Some(self.model.clone()),
                base_url: Some(self.base_url.clone()),
                timeout_secs: Some(self.timeout_secs),
                temperature: self.temperature,
            }),
            chunking: Some(ChunkingConfig {
                chunk_size: Some(self.chunk_size),
                chunk_overlap: Some(self.chunk_overlap),
            }),
            extraction: Some(ExtractionConfig {
                tesseract_path: Some(self.tesseract_path.display().to_string()),
                ocr_language: Some(self.ocr_language.clone()),
                render_dpi: Some(self.render_dpi),
                header_exclusion: Some(self.header_exclusion),
                footer_exclusion: Some(self.footer_exclusion),
            }),
            prompt: Some(PromptConfig {
                variant: Some(self.prompt_variant),
                template_path: self
                    .template_path
                    .as_ref()
                    .map(|p| p.display().to_string()),
            }),
        }
    }

    /// Apply `GOOGLE_API_KEY`, `BOOKDIFF_MODEL` and `TESSERACT_PATH`.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Like [`Config::apply_env`] with a custom lookup. Empty values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GOOGLE_API_KEY") {
            self.google_api_key = Some(key);
        }
        if let Some(model) = get("BOOKDIFF_MODEL") {
            self.model = model;
        }
        if let Some(path) = get("TESSERACT_PATH") {
            self.tesseract_path = PathBuf::from(path);
        }
    }

    pub fn splitter(&self) -> Result<RecursiveCharacterSplitter, ChunkingError> {
        RecursiveCharacterSplitter::new(self.chunk_size, self.chunk_overlap)
    }

    /// Build the Gemini client. Fails if no API key is configured.
    pub fn chat_client(&self) -> Result<GeminiClient, ChatError> {
        let key = self
            .google_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(ChatError::MissingApiKey)?;
        let mut client = GeminiClient::new(key, &self.model)
            .with_base_url(&self.base_url)
            .with_timeout(Duration::from_secs(self.timeout_secs));
        if let Some(t) = self.temperature {
            client = client.with_temperature(t);
        }
        Ok(client)
    }
}
