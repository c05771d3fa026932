//! Chat-completion backends.

pub mod gemini;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use gemini::GeminiClient;

/// Who produced a message in the model's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited (429)")]
    RateLimited,
    #[error("chat API error: {0}")]
    Api(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("missing API key (set GOOGLE_API_KEY or api_keys.google_api_key)")]
    MissingApiKey,
}

/// A text-in/text-out chat service.
///
/// Each call is one request/response round trip. The caller owns the history
/// and passes it on every call; see [`crate::conversation::Conversation`].
pub trait ChatClient: Send + Sync {
    fn name(&self) -> &str;

    fn send<'a>(
        &'a self,
        history: &'a [ChatMessage],
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, ChatError>> + Send + 'a>>;
}
