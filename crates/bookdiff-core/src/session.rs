//! One user's working state: loaded textbooks, chat history and transcript.

use thiserror::Error;

use crate::chat::{ChatClient, ChatError};
use crate::conversation::{Conversation, Speaker, Transcript};
use crate::prompts::PromptSet;
use crate::{DocumentOutcome, Textbook};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("comparison needs exactly two extracted textbooks, have {0}")]
    NeedTwoTextbooks(usize),
    #[error("no textbook at position {index} ({loaded} loaded)")]
    UnknownTextbook { index: usize, loaded: usize },
    #[error("textbook {0:?} has no text to answer from")]
    EmptyContext(String),
    #[error("question is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Chat(#[from] ChatError),
}

/// Owned by whoever drives the session and passed by `&mut` into each call.
#[derive(Debug, Default)]
pub struct Session {
    textbooks: Vec<Textbook>,
    conversation: Conversation,
    transcript: Transcript,
    last_comparison: Option<String>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the extracted textbooks from a batch, in upload order.
    /// Returns how many textbooks are now loaded.
    pub fn ingest(&mut self, outcomes: impl IntoIterator<Item = DocumentOutcome>) -> usize {
        for outcome in outcomes {
            if let DocumentOutcome::Extracted(book) = outcome {
                tracing::debug!(book = %book.name, chunks = book.chunks.len(), "textbook loaded");
                self.textbooks.push(book);
            }
        }
        self.textbooks.len()
    }

    pub fn textbooks(&self) -> &[Textbook] {
        &self.textbooks
    }

    /// Textbooks are addressed by upload position; two uploads may share a
    /// file name.
    pub fn textbook(&self, index: usize) -> Option<&Textbook> {
        self.textbooks.get(index)
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn last_comparison(&self) -> Option<&str> {
        self.last_comparison.as_deref()
    }

    /// Ask the model to compare the two loaded textbooks.
    pub async fn compare(
        &mut self,
        client: &dyn ChatClient,
        prompts: &PromptSet,
    ) -> Result<String, SessionError> {
        let [first, second] = self.textbooks.as_slice() else {
            return Err(SessionError::NeedTwoTextbooks(self.textbooks.len()));
        };
        let prompt = prompts.comparison([
            (first.name.as_str(), first.text.as_str()),
            (second.name.as_str(), second.text.as_str()),
        ]);
        tracing::info!(
            client = client.name(),
            variant = %prompts.variant,
            prompt_chars = prompt.chars().count(),
            "requesting comparison"
        );

        let result = self.conversation.send(client, &prompt).await?;
        self.last_comparison = Some(result.clone());
        Ok(result)
    }

    /// Answer `question` from the chunks of the textbook at `book`.
    ///
    /// Each chunk is sent as its own prompt through the conversation and the
    /// replies are joined with a single space.
    pub async fn ask(
        &mut self,
        client: &dyn ChatClient,
        prompts: &PromptSet,
        book: usize,
        question: &str,
    ) -> Result<String, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let book = self
            .textbooks
            .get(book)
            .ok_or(SessionError::UnknownTextbook {
                index: book,
                loaded: self.textbooks.len(),
            })?;
        if book.chunks.is_empty() {
            return Err(SessionError::EmptyContext(book.name.clone()));
        }

        let mut answers = Vec::with_capacity(book.chunks.len());
        for (i, chunk) in book.chunks.iter().enumerate() {
            tracing::debug!(book = %book.name, chunk = i + 1, of = book.chunks.len(), "asking");
            let prompt = prompts.question(&book.name, chunk, question);
            answers.push(self.conversation.send(client, &prompt).await?);
        }
        let answer = answers.join(" ").trim().to_string();

        self.transcript.push(Speaker::You, question);
        self.transcript.push(Speaker::Bot, answer.clone());
        Ok(answer)
    }

    /// Forget the chat history and transcript; keep the textbooks.
    pub fn reset_conversation(&mut self) {
        self.conversation.clear();
        self.transcript = Transcript::default();
        self.last_comparison = None;
    }
}
