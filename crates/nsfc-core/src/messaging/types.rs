use chrono::{DateTime, Utc};

use crate::domain::{ChatId, MessageId, MessageRef};

/// An outbound message the bot wants to send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Draft {
    pub chat_id: ChatId,
    pub text: String,
    pub reply_to: Option<MessageId>,
    pub disable_notification: bool,
}

impl Draft {
    pub fn text(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            reply_to: None,
            disable_notification: false,
        }
    }

    pub fn reply_to(mut self, message_id: MessageId) -> Self {
        self.reply_to = Some(message_id);
        self
    }

    pub fn silent(mut self) -> Self {
        self.disable_notification = true;
        self
    }

    /// Same draft settings, different body (used when splitting).
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }
}

/// Result of a successful send.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub message: MessageRef,
    pub date: DateTime<Utc>,
}

/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// One article result for an inline query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineAnswer {
    pub id: String,
    pub title: String,
    pub text: String,
    pub description: Option<String>,
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub max_message_len: usize,
}
