//! Platform-neutral inbound update model.
//!
//! The Telegram adapter converts raw updates into [`InboundUpdate`]; the
//! classifier then narrows them into the [`Update`] variants the pipeline
//! acts on.

use chrono::{DateTime, Utc};

use crate::{
    domain::{Chat, ChatId, MessageId, MessageRef, Sender},
    edit_cache::CorrelationKey,
};

/// Raw inbound event, before classification.
#[derive(Clone, Debug)]
pub enum InboundUpdate {
    Message(InboundMessage),
    EditedMessage(InboundMessage),
    InlineQuery(InlineQuery),
    CallbackQuery(CallbackQuery),
    /// Anything the pipeline has no branch for (channel posts, polls, ...).
    Other,
}

#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub chat: Chat,
    pub from: Option<Sender>,
    pub message_id: MessageId,
    pub text: Option<String>,
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
    pub reply_to: Option<RepliedMessage>,
    pub new_members: Vec<Sender>,
    pub left_member: Option<Sender>,
}

/// The message an inbound message replies to (only what classification needs).
#[derive(Clone, Debug)]
pub struct RepliedMessage {
    pub text: Option<String>,
    pub from_is_bot: bool,
}

/// Classified update; owned by the worker that processes it.
#[derive(Clone, Debug)]
pub enum Update {
    InlineQuery(InlineQuery),
    CallbackQuery(CallbackQuery),
    PrivateReply(PrivateReply),
    Command(CommandMessage),
    MemberJoined(MemberJoined),
    MemberLeft(MemberLeft),
}

impl Update {
    pub fn kind(&self) -> &'static str {
        match self {
            Update::InlineQuery(_) => "inline_query",
            Update::CallbackQuery(_) => "callback_query",
            Update::PrivateReply(_) => "private_reply",
            Update::Command(_) => "command",
            Update::MemberJoined(_) => "member_joined",
            Update::MemberLeft(_) => "member_left",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandMessage {
    pub chat: Chat,
    pub from: Sender,
    pub message_id: MessageId,
    /// Command name without the leading `/` and any `@botname` suffix.
    pub name: String,
    pub args: String,
    pub text: String,
    /// Original send time. Edits keep this unchanged.
    pub date: DateTime<Utc>,
    pub edit_date: Option<DateTime<Utc>>,
}

impl CommandMessage {
    pub fn is_edited(&self) -> bool {
        self.edit_date.is_some()
    }

    pub fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.chat.id, self.from.id, self.date)
    }
}

#[derive(Clone, Debug)]
pub struct PrivateReply {
    pub chat_id: ChatId,
    pub from: Sender,
    pub message_id: MessageId,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct MemberJoined {
    pub chat: Chat,
    pub members: Vec<Sender>,
}

#[derive(Clone, Debug)]
pub struct MemberLeft {
    pub chat: Chat,
    pub member: Sender,
}

#[derive(Clone, Debug)]
pub struct InlineQuery {
    pub id: String,
    pub from: Sender,
    pub query: String,
    pub offset: String,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub id: String,
    pub from: Sender,
    pub data: Option<String>,
    pub message: Option<MessageRef>,
}
