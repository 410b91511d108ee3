use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{ChatAction, Draft, InlineAnswer, MessagingCapabilities, SentMessage},
    Result,
};

/// Outbound chat platform port.
///
/// Telegram is the only implementation; the pipeline and its tests only ever
/// talk to this trait.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, draft: &Draft) -> Result<SentMessage>;
    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn answer_inline_query(&self, query_id: &str, results: Vec<InlineAnswer>) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}
