//! Per-update processing: classification, freshness, reply cleanup, edit
//! correlation, routing and outbound dispatch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    classifier::classify,
    dispatcher::{DispatchReport, OutboundDispatcher},
    domain::{MessageId, MessageRef, UserId},
    edit_cache::{EditCache, EditTarget},
    freshness::{Freshness, FreshnessPolicy},
    membership,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, Draft},
    },
    registry::{delete_records, SentMessageRegistry, SweepReport},
    router::CommandRouter,
    store::Store,
    update::{CallbackQuery, CommandMessage, InboundUpdate, InlineQuery, PrivateReply, Update},
};

/// Admin command that purges tracked replies in the current chat.
const PURGE_COMMAND: &str = "clear";

#[derive(Clone, Copy, Debug)]
pub struct PipelineSettings {
    pub freshness: FreshnessPolicy,
    pub message_limit: usize,
    pub admin_id: Option<UserId>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            freshness: FreshnessPolicy::default(),
            message_limit: 4096,
            admin_id: None,
        }
    }
}

/// Collaborators the pipeline is built from.
///
/// The registry and cache are passed in so that the owner (and tests) can
/// inspect or sweep them independently of the workers.
pub struct PipelineParts {
    pub router: Arc<dyn CommandRouter>,
    pub store: Arc<dyn Store>,
    pub messenger: Arc<dyn MessagingPort>,
    pub registry: Arc<SentMessageRegistry>,
    pub cache: Arc<EditCache>,
}

/// What happened to one update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Ignored,
    Stale(Freshness),
    Purged(SweepReport),
    Dispatched(DispatchReport),
    Handled,
}

pub struct Pipeline {
    router: Arc<dyn CommandRouter>,
    store: Arc<dyn Store>,
    messenger: Arc<dyn MessagingPort>,
    registry: Arc<SentMessageRegistry>,
    cache: Arc<EditCache>,
    dispatcher: OutboundDispatcher,
    settings: PipelineSettings,
    background: TaskTracker,
}

impl Pipeline {
    pub fn new(parts: PipelineParts, settings: PipelineSettings) -> Self {
        let dispatcher = OutboundDispatcher::new(
            parts.messenger.clone(),
            parts.registry.clone(),
            parts.cache.clone(),
            settings.message_limit,
        );
        Self {
            router: parts.router,
            store: parts.store,
            messenger: parts.messenger,
            registry: parts.registry,
            cache: parts.cache,
            dispatcher,
            settings,
            background: TaskTracker::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SentMessageRegistry> {
        &self.registry
    }

    pub fn messenger(&self) -> &Arc<dyn MessagingPort> {
        &self.messenger
    }

    /// Wait for background reply deletions started so far.
    pub async fn flush_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    pub async fn handle(&self, raw: InboundUpdate) -> Outcome {
        self.handle_at(raw, Utc::now()).await
    }

    pub async fn handle_at(&self, raw: InboundUpdate, now: DateTime<Utc>) -> Outcome {
        match classify(raw) {
            Some(update) => self.process_at(update, now).await,
            None => Outcome::Ignored,
        }
    }

    pub async fn process_at(&self, update: Update, now: DateTime<Utc>) -> Outcome {
        debug!(kind = update.kind(), "processing update");
        match update {
            Update::Command(cmd) => self.on_command(cmd, now).await,
            Update::InlineQuery(q) => {
                self.on_inline_query(&q).await;
                Outcome::Handled
            }
            Update::CallbackQuery(q) => {
                self.on_callback_query(&q).await;
                Outcome::Handled
            }
            Update::PrivateReply(reply) => {
                self.on_password_reply(&reply).await;
                Outcome::Handled
            }
            Update::MemberJoined(ev) => {
                membership::on_members_joined(self.store.as_ref(), &ev).await;
                Outcome::Handled
            }
            Update::MemberLeft(ev) => {
                membership::on_member_left(self.store.as_ref(), &ev).await;
                Outcome::Handled
            }
        }
    }

    async fn on_command(&self, cmd: CommandMessage, now: DateTime<Utc>) -> Outcome {
        let freshness = self.settings.freshness.check(&cmd, now);
        if !freshness.is_fresh() {
            info!(chat_id = cmd.chat.id.0, reason = ?freshness, text = %cmd.text, "old message dropped");
            return Outcome::Stale(freshness);
        }

        if !cmd.is_edited() {
            self.sweep_in_background(now).await;
        }

        if cmd.name == PURGE_COMMAND && self.settings.admin_id == Some(cmd.from.id) {
            let report = self
                .registry
                .purge_chat(cmd.chat.id, self.messenger.as_ref())
                .await;
            return Outcome::Purged(report);
        }

        let edit_target = if cmd.is_edited() {
            info!(chat_id = cmd.chat.id.0, text = %cmd.text, "edited command received");
            self.resolve_edit_target(&cmd).await
        } else {
            None
        };

        if let Err(e) = self
            .messenger
            .send_chat_action(cmd.chat.id, ChatAction::Typing)
            .await
        {
            debug!(chat_id = cmd.chat.id.0, error = %e, "typing indicator failed");
        }

        let report = match self.router.run(&cmd).await {
            Ok(drafts) => self.dispatcher.dispatch(&cmd, edit_target, drafts).await,
            Err(err) => self.dispatcher.dispatch_error(&cmd, edit_target, err).await,
        };
        Outcome::Dispatched(report)
    }

    /// Take stale records now; delete them off the command's path.
    ///
    /// Deletes go through the per-chat throttle, so a backlog would otherwise
    /// hold up the reply.
    async fn sweep_in_background(&self, now: DateTime<Utc>) {
        let stale = self.registry.take_stale(now).await;
        if stale.is_empty() {
            return;
        }
        let messenger = self.messenger.clone();
        self.background.spawn(async move {
            let report = delete_records(&stale, messenger.as_ref()).await;
            info!(
                deleted = report.deleted,
                failed = report.failed,
                "swept stale replies"
            );
        });
    }

    /// For an edited command, find the single reply to rewrite.
    ///
    /// Split replies cannot be rewritten consistently, so they are deleted
    /// and the command is answered afresh.
    async fn resolve_edit_target(&self, cmd: &CommandMessage) -> Option<MessageId> {
        let key = cmd.correlation_key();
        match self.cache.take_edit_target(&key) {
            EditTarget::None => None,
            EditTarget::Single(id) => Some(id),
            EditTarget::Ambiguous(ids) => {
                debug!(key = %key, count = ids.len(), "deleting split reply before re-answering");
                for &id in &ids {
                    let msg = MessageRef::new(cmd.chat.id, id);
                    if let Err(e) = self.messenger.delete_message(msg).await {
                        warn!(chat_id = cmd.chat.id.0, message_id = id.0, error = %e, "failed to delete superseded reply");
                    }
                }
                self.registry.forget(cmd.chat.id, &ids).await;
                None
            }
        }
    }

    async fn on_inline_query(&self, q: &InlineQuery) {
        match self.router.inline_query(q).await {
            Ok(results) => {
                if let Err(e) = self.messenger.answer_inline_query(&q.id, results).await {
                    error!(query_id = %q.id, error = %e, "answer inline query failed");
                }
            }
            Err(e) => warn!(query_id = %q.id, error = %e, "inline query failed"),
        }
    }

    async fn on_callback_query(&self, q: &CallbackQuery) {
        let text = match self.router.callback_query(q).await {
            Ok(text) => text,
            Err(e) => {
                warn!(callback_id = %q.id, error = %e, "callback query failed");
                e.reply_text
            }
        };
        if let Err(e) = self
            .messenger
            .answer_callback_query(&q.id, text.as_deref())
            .await
        {
            error!(callback_id = %q.id, error = %e, "answer callback query failed");
        }
    }

    async fn on_password_reply(&self, reply: &PrivateReply) {
        let drafts = match self.router.password_reply(reply).await {
            Ok(drafts) => drafts,
            Err(e) => {
                error!(user_id = reply.from.id.0, error = %e, "password reply failed");
                e.reply_text
                    .map(|t| vec![Draft::text(reply.chat_id, t).reply_to(reply.message_id)])
                    .unwrap_or_default()
            }
        };
        for draft in drafts {
            if let Err(e) = self.messenger.send_text(&draft).await {
                error!(chat_id = draft.chat_id.0, error = %e, "password reply send failed");
            }
        }
    }
}
