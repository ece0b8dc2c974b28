//! Message types - search previews and fetched bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A search hit without its body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreview {
    /// Store-assigned message id
    pub id: String,

    /// Subject line
    pub subject: String,

    /// Sender address (may include a display name)
    pub sender: String,

    /// When the message was sent
    pub date: DateTime<Utc>,
}

impl MessagePreview {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            sender: sender.into(),
            date,
        }
    }
}

/// A fully fetched message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub date: DateTime<Utc>,

    /// Plain-text body
    pub body: String,
}

impl MessageContent {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        date: DateTime<Utc>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            sender: sender.into(),
            date,
            body: body.into(),
        }
    }

    /// The preview for this message (drops the body).
    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            id: self.id.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            date: self.date,
        }
    }

    /// The body truncated to at most `max_chars` characters.
    pub fn body_excerpt(&self, max_chars: usize) -> &str {
        match self.body.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.body[..idx],
            None => &self.body,
        }
    }
}
