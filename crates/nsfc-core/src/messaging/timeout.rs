use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    domain::{ChatId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, Draft, InlineAnswer, MessagingCapabilities, SentMessage},
    },
    Result,
};

/// MessagingPort decorator that bounds every outbound call.
///
/// A call that exceeds the limit fails with [`Error::Timeout`] so the worker
/// can log it and move on to the next update.
pub struct TimeoutMessenger {
    inner: Arc<dyn MessagingPort>,
    limit: Duration,
}

impl TimeoutMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(self.limit)),
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for TimeoutMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(&self, draft: &Draft) -> Result<SentMessage> {
        self.bounded(self.inner.send_text(draft)).await
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.bounded(self.inner.edit_text(msg, text)).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.bounded(self.inner.delete_message(msg)).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.bounded(self.inner.send_chat_action(chat_id, action))
            .await
    }

    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineAnswer>) -> Result<()> {
        self.bounded(self.inner.answer_inline_query(query_id, results))
            .await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.bounded(self.inner.answer_callback_query(callback_id, text))
            .await
    }
}
