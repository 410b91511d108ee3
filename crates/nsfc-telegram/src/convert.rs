//! Telegram update -> core `InboundUpdate` conversion.

use teloxide::types::{Message, Update, UpdateKind, User};

use nsfc_core::{
    domain::{Chat, ChatId, ChatKind, MessageId, MessageRef, Sender, UserId},
    update::{CallbackQuery, InboundMessage, InboundUpdate, InlineQuery, RepliedMessage},
};

pub fn inbound_update(upd: Update) -> InboundUpdate {
    match upd.kind {
        UpdateKind::Message(msg) => InboundUpdate::Message(inbound_message(&msg)),
        UpdateKind::EditedMessage(msg) => InboundUpdate::EditedMessage(inbound_message(&msg)),
        UpdateKind::InlineQuery(q) => InboundUpdate::InlineQuery(InlineQuery {
            id: q.id,
            from: sender(&q.from),
            query: q.query,
            offset: q.offset,
        }),
        UpdateKind::CallbackQuery(q) => InboundUpdate::CallbackQuery(CallbackQuery {
            id: q.id,
            from: sender(&q.from),
            data: q.data,
            message: q
                .message
                .as_ref()
                .map(|m| MessageRef::new(ChatId(m.chat.id.0), MessageId(m.id.0))),
        }),
        _ => InboundUpdate::Other,
    }
}

fn inbound_message(msg: &Message) -> InboundMessage {
    InboundMessage {
        chat: chat(&msg.chat),
        from: msg.from().map(sender),
        message_id: MessageId(msg.id.0),
        text: msg.text().map(|t| t.to_string()),
        date: msg.date,
        edit_date: msg.edit_date().copied(),
        reply_to: msg.reply_to_message().map(|r| RepliedMessage {
            text: r.text().map(|t| t.to_string()),
            from_is_bot: r.from().map(|u| u.is_bot).unwrap_or(false),
        }),
        new_members: msg
            .new_chat_members()
            .map(|users| users.iter().map(sender).collect())
            .unwrap_or_default(),
        left_member: msg.left_chat_member().map(sender),
    }
}

fn chat(c: &teloxide::types::Chat) -> Chat {
    let kind = if c.is_private() {
        ChatKind::Private
    } else if c.is_supergroup() {
        ChatKind::Supergroup
    } else if c.is_group() {
        ChatKind::Group
    } else {
        ChatKind::Channel
    };
    Chat {
        id: ChatId(c.id.0),
        kind,
        title: c.title().map(|t| t.to_string()),
    }
}

fn sender(u: &User) -> Sender {
    Sender {
        id: UserId(u.id.0 as i64),
        is_bot: u.is_bot,
        first_name: u.first_name.clone(),
        last_name: u.last_name.clone(),
        username: u.username.clone(),
    }
}
