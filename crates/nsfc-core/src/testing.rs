//! Fakes and fixtures shared by the unit tests.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    domain::{Chat, ChatId, ChatKind, MessageId, MessageRef, Sender, UserId},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, Draft, InlineAnswer, MessagingCapabilities, SentMessage},
    },
    router::{CommandError, CommandResult, CommandRouter},
    update::{CallbackQuery, CommandMessage, InboundMessage, InlineQuery, PrivateReply},
    Result,
};

/// 2026-01-01T00:00:00Z plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_767_225_600 + secs, 0)
        .single()
        .expect("valid timestamp")
}

pub fn sender(id: i64) -> Sender {
    Sender {
        id: UserId(id),
        is_bot: false,
        first_name: format!("user{id}"),
        last_name: None,
        username: None,
    }
}

/// Negative chat ids are groups, positive ones private chats.
pub fn chat(id: i64) -> Chat {
    Chat {
        id: ChatId(id),
        kind: if id < 0 {
            ChatKind::Group
        } else {
            ChatKind::Private
        },
        title: (id < 0).then(|| "test group".to_string()),
    }
}

pub fn command(chat_id: i64, user_id: i64, name: &str, date: DateTime<Utc>) -> CommandMessage {
    CommandMessage {
        chat: chat(chat_id),
        from: sender(user_id),
        message_id: MessageId(500),
        name: name.to_string(),
        args: String::new(),
        text: format!("/{name}"),
        date,
        edit_date: None,
    }
}

pub fn inbound(kind: ChatKind, text: &str, date: DateTime<Utc>) -> InboundMessage {
    InboundMessage {
        chat: Chat {
            id: ChatId(if kind.is_private() { 1 } else { -100 }),
            kind,
            title: None,
        },
        from: Some(sender(1)),
        message_id: MessageId(500),
        text: Some(text.to_string()),
        date,
        edit_date: None,
        reply_to: None,
        new_members: vec![],
        left_member: None,
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: Mutex<i32>,
    now: Mutex<Option<DateTime<Utc>>>,
    delay: Option<Duration>,
    delete_delay: Option<Duration>,
    max_len: Option<usize>,
    no_edits: bool,
    fail_deletes: bool,
    fail_sends: Mutex<HashSet<usize>>,
    send_calls: AtomicUsize,
    sends: Mutex<Vec<Draft>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    actions: Mutex<Vec<ChatId>>,
    inline_answers: Mutex<Vec<(String, Vec<InlineAnswer>)>>,
    callback_answers: Mutex<Vec<(String, Option<String>)>>,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every delete takes `delay` (other calls stay instant).
    pub fn slow_deletes(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn without_edits(mut self) -> Self {
        self.no_edits = true;
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Fail the `n`th send call (0-based).
    pub fn fail_nth_send(&self, n: usize) {
        self.fail_sends.lock().unwrap().insert(n);
    }

    /// Timestamp reported for sent messages (defaults to `ts(0)`).
    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = Some(now);
    }

    pub fn sent_drafts(&self) -> Vec<Draft> {
        self.sends.lock().unwrap().clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent_drafts().into_iter().map(|d| d.text).collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn chat_actions(&self) -> Vec<ChatId> {
        self.actions.lock().unwrap().clone()
    }

    pub fn inline_answers(&self) -> Vec<(String, Vec<InlineAnswer>)> {
        self.inline_answers.lock().unwrap().clone()
    }

    pub fn callback_answers(&self) -> Vec<(String, Option<String>)> {
        self.callback_answers.lock().unwrap().clone()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let mut guard = self.next_id.lock().unwrap();
        let id = *guard;
        *guard += 1;
        MessageRef::new(chat_id, MessageId(id))
    }

    async fn maybe_delay(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: !self.no_edits,
            max_message_len: self.max_len.unwrap_or(4096),
        }
    }

    async fn send_text(&self, draft: &Draft) -> Result<SentMessage> {
        self.maybe_delay().await;
        let call = self.send_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.lock().unwrap().contains(&call) {
            return Err(Error::External("send rejected".to_string()));
        }
        self.sends.lock().unwrap().push(draft.clone());
        let date = self.now.lock().unwrap().unwrap_or_else(|| ts(0));
        Ok(SentMessage {
            message: self.alloc(draft.chat_id),
            date,
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.maybe_delay().await;
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.maybe_delay().await;
        if let Some(d) = self.delete_delay {
            tokio::time::sleep(d).await;
        }
        if self.fail_deletes {
            return Err(Error::External("message can't be deleted".to_string()));
        }
        self.deletes.lock().unwrap().push(msg);
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, _action: ChatAction) -> Result<()> {
        self.actions.lock().unwrap().push(chat_id);
        Ok(())
    }

    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineAnswer>) -> Result<()> {
        self.inline_answers
            .lock()
            .unwrap()
            .push((query_id.to_string(), results));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.callback_answers
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(|t| t.to_string())));
        Ok(())
    }
}

type Responder = Box<dyn Fn(&CommandMessage) -> CommandResult + Send + Sync>;

/// Router that counts calls and answers through a closure.
pub struct FakeRouter {
    calls: AtomicUsize,
    responder: Responder,
}

impl FakeRouter {
    pub fn new(responder: impl Fn(&CommandMessage) -> CommandResult + Send + Sync + 'static) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            responder: Box::new(responder),
        }
    }

    /// Replies with `text` in the command's chat.
    pub fn replying(text: &'static str) -> Self {
        Self::new(move |cmd| Ok(vec![Draft::text(cmd.chat.id, text).reply_to(cmd.message_id)]))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRouter for FakeRouter {
    async fn run(&self, cmd: &CommandMessage) -> CommandResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(cmd)
    }

    async fn inline_query(
        &self,
        query: &InlineQuery,
    ) -> std::result::Result<Vec<InlineAnswer>, CommandError> {
        Ok(vec![InlineAnswer {
            id: "1".to_string(),
            title: query.query.clone(),
            text: query.query.clone(),
            description: None,
        }])
    }

    async fn callback_query(
        &self,
        query: &CallbackQuery,
    ) -> std::result::Result<Option<String>, CommandError> {
        Ok(query.data.clone())
    }

    async fn password_reply(&self, reply: &PrivateReply) -> CommandResult {
        Ok(vec![Draft::text(reply.chat_id, "password updated")])
    }
}
