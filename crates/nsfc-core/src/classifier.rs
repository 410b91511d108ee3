//! Narrows raw inbound updates into the branches the pipeline handles.
//!
//! Precedence: inline query, callback query, private password reply,
//! command, member left, members joined.

use tracing::debug;

use crate::update::{
    CommandMessage, InboundMessage, InboundUpdate, MemberJoined, MemberLeft, PrivateReply, Update,
};

/// Text of the bot prompt that a private password reply must answer.
pub const PASSWORD_PROMPT: &str = "请输入新的密码";

pub fn classify(update: InboundUpdate) -> Option<Update> {
    match update {
        InboundUpdate::InlineQuery(q) => Some(Update::InlineQuery(q)),
        InboundUpdate::CallbackQuery(q) => Some(Update::CallbackQuery(q)),
        InboundUpdate::Message(msg) | InboundUpdate::EditedMessage(msg) => classify_message(msg),
        InboundUpdate::Other => None,
    }
}

fn classify_message(msg: InboundMessage) -> Option<Update> {
    let command = msg.text.as_deref().and_then(parse_command);

    if msg.chat.kind.is_private() && command.is_none() && is_password_reply(&msg) {
        let from = msg.from?;
        return Some(Update::PrivateReply(PrivateReply {
            chat_id: msg.chat.id,
            from,
            message_id: msg.message_id,
            text: msg.text.unwrap_or_default(),
        }));
    }

    if let Some((name, args)) = command {
        if !msg.chat.kind.accepts_commands() {
            return None;
        }
        let Some(from) = msg.from else {
            debug!(chat_id = msg.chat.id.0, "command without sender ignored");
            return None;
        };
        return Some(Update::Command(CommandMessage {
            chat: msg.chat,
            from,
            message_id: msg.message_id,
            name,
            args,
            text: msg.text.unwrap_or_default(),
            date: msg.date,
            edit_date: msg.edit_date,
        }));
    }

    if msg.chat.kind.is_private() {
        return None;
    }

    if let Some(member) = msg.left_member {
        return Some(Update::MemberLeft(MemberLeft {
            chat: msg.chat,
            member,
        }));
    }

    if !msg.new_members.is_empty() {
        return Some(Update::MemberJoined(MemberJoined {
            chat: msg.chat,
            members: msg.new_members,
        }));
    }

    None
}

fn is_password_reply(msg: &InboundMessage) -> bool {
    msg.reply_to
        .as_ref()
        .is_some_and(|r| r.from_is_bot && r.text.as_deref() == Some(PASSWORD_PROMPT))
}

/// Split `/name@bot args` into `("name", "args")`.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix('/')?;
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let name = head.split_once('@').map(|(n, _)| n).unwrap_or(head);
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), args.to_string()))
}
