use std::fmt;

use serde::Serialize;

use crate::chat::{ChatClient, ChatError, ChatMessage};

/// The model-facing chat history of one user session.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Send `prompt` with the full history and record both turns.
    ///
    /// History is only extended when the request succeeds.
    pub async fn send(&mut self, client: &dyn ChatClient, prompt: &str) -> Result<String, ChatError> {
        let reply = client.send(&self.messages, prompt).await?;
        self.messages.push(ChatMessage::user(prompt));
        self.messages.push(ChatMessage::model(reply.clone()));
        Ok(reply)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Speaker {
    You,
    Bot,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::You => write!(f, "You"),
            Speaker::Bot => write!(f, "Bot"),
        }
    }
}

/// What the user saw: their questions and the answers, in order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    entries: Vec<(Speaker, String)>,
}

impl Transcript {
    pub fn push(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.entries.push((speaker, text.into()));
    }

    pub fn entries(&self) -> &[(Speaker, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;
    use crate::mock::{MockChat, MockReply};

    #[tokio::test]
    async fn successful_send_records_both_turns() {
        let chat = MockChat::new(MockReply::Text("answer".into()));
        let mut conversation = Conversation::new();

        let reply = conversation.send(&chat, "question").await.unwrap();
        assert_eq!(reply, "answer");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, ChatRole::User);
        assert_eq!(conversation.messages()[1].text, "answer");
    }

    #[tokio::test]
    async fn history_is_sent_with_each_request() {
        let chat = MockChat::new(MockReply::Echo);
        let mut conversation = Conversation::new();

        conversation.send(&chat, "one").await.unwrap();
        let second = conversation.send(&chat, "two").await.unwrap();
        assert_eq!(second, "[2] two");
        assert_eq!(chat.requests(), vec![(0, "one".into()), (2, "two".into())]);
    }

    #[tokio::test]
    async fn failed_send_leaves_history_untouched() {
        let chat = MockChat::with_sequence(vec![
            MockReply::Text("ok".into()),
            MockReply::RateLimited,
        ]);
        let mut conversation = Conversation::new();

        conversation.send(&chat, "first").await.unwrap();
        let err = conversation.send(&chat, "second").await.unwrap_err();
        assert!(matches!(err, ChatError::RateLimited));
        assert_eq!(conversation.len(), 2);
    }

    #[test]
    fn speakers_display_as_labels() {
        let mut transcript = Transcript::default();
        transcript.push(Speaker::You, "q");
        transcript.push(Speaker::Bot, "a");
        let lines: Vec<String> = transcript
            .entries()
            .iter()
            .map(|(who, text)| format!("{who}: {text}"))
            .collect();
        assert_eq!(lines, vec!["You: q", "Bot: a"]);
    }
}
