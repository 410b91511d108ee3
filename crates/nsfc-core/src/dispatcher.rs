//! Sends router output: splits oversized text, edits in place when an edited
//! command maps to exactly one earlier reply, and records what was sent.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    domain::{MessageId, MessageRef},
    edit_cache::EditCache,
    messaging::{port::MessagingPort, types::Draft},
    registry::SentMessageRegistry,
    router::{CommandError, CommandFailure},
    update::CommandMessage,
};

/// Commands whose replies are meant to stay in the chat.
const PERSISTENT_REPLY_COMMANDS: &[&str] = &["open"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub edited: usize,
    pub failed: usize,
}

pub struct OutboundDispatcher {
    messenger: Arc<dyn MessagingPort>,
    registry: Arc<SentMessageRegistry>,
    cache: Arc<EditCache>,
    max_len: usize,
    can_edit: bool,
}

impl OutboundDispatcher {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        registry: Arc<SentMessageRegistry>,
        cache: Arc<EditCache>,
        max_len: usize,
    ) -> Self {
        let caps = messenger.capabilities();
        Self {
            messenger,
            registry,
            cache,
            max_len: max_len.min(caps.max_message_len).max(1),
            can_edit: caps.supports_edit,
        }
    }

    /// Deliver `drafts` for `cmd`.
    ///
    /// `edit_target` is the single earlier reply an edited command may rewrite.
    pub async fn dispatch(
        &self,
        cmd: &CommandMessage,
        edit_target: Option<MessageId>,
        drafts: Vec<Draft>,
    ) -> DispatchReport {
        if let Some(target) = edit_target {
            let target = MessageRef::new(cmd.chat.id, target);
            if let [only] = drafts.as_slice() {
                if self.fits_in_place(cmd, only) {
                    return self.edit_in_place(target, only).await;
                }
            }
            // The new answer cannot replace the old reply: drop it and answer afresh.
            self.retire(cmd, target).await;
        }

        let mut report = DispatchReport::default();
        let mut sent_ids = Vec::new();
        let record_replies = !cmd.chat.kind.is_private()
            && !PERSISTENT_REPLY_COMMANDS.contains(&cmd.name.as_str());

        for draft in drafts {
            if draft.text.is_empty() {
                continue;
            }
            let same_chat = draft.chat_id == cmd.chat.id;
            let chunks = split_text(&draft.text, self.max_len);
            let split = chunks.len() > 1;

            for chunk in chunks {
                let mut part = draft.with_text(chunk);
                if same_chat && (split || part.reply_to.is_none()) {
                    part.reply_to = Some(cmd.message_id);
                }

                let sent = match self.messenger.send_text(&part).await {
                    Ok(sent) => sent,
                    Err(e) => {
                        error!(chat_id = part.chat_id.0, command = %cmd.name, error = %e, "send message failed");
                        report.failed += 1;
                        continue;
                    }
                };
                report.sent += 1;

                // Only replies in the command's own chat belong to its correlation key.
                if same_chat {
                    sent_ids.push(sent.message.message_id);
                    if record_replies {
                        self.registry
                            .record(sent.message.chat_id, sent.message.message_id, sent.date)
                            .await;
                    }
                }
            }
        }

        if !sent_ids.is_empty() {
            let key = cmd.correlation_key();
            debug!(key = %key, ids = sent_ids.len(), "cached replies for edits");
            self.cache.put(key, sent_ids);
        }
        report
    }

    /// Log a router failure and answer with its display text, if any.
    pub async fn dispatch_error(
        &self,
        cmd: &CommandMessage,
        edit_target: Option<MessageId>,
        err: CommandError,
    ) -> DispatchReport {
        match &err.cause {
            CommandFailure::NotFound(what) => {
                debug!(command = %cmd.name, what = %what, "command found nothing")
            }
            CommandFailure::Other(cause) => {
                warn!(command = %cmd.name, chat_id = cmd.chat.id.0, error = %cause, "command failed")
            }
        }

        let Some(text) = err.reply_text else {
            return DispatchReport::default();
        };
        let reply = Draft::text(cmd.chat.id, text).reply_to(cmd.message_id);
        self.dispatch(cmd, edit_target, vec![reply]).await
    }

    fn fits_in_place(&self, cmd: &CommandMessage, draft: &Draft) -> bool {
        self.can_edit
            && draft.chat_id == cmd.chat.id
            && !draft.text.is_empty()
            && draft.text.chars().count() <= self.max_len
    }

    async fn retire(&self, cmd: &CommandMessage, target: MessageRef) {
        if let Err(e) = self.messenger.delete_message(target).await {
            warn!(
                chat_id = target.chat_id.0,
                message_id = target.message_id.0,
                error = %e,
                "failed to delete superseded reply"
            );
        }
        self.registry.forget(target.chat_id, &[target.message_id]).await;
        self.cache.remove(&cmd.correlation_key());
    }

    async fn edit_in_place(&self, target: MessageRef, draft: &Draft) -> DispatchReport {
        match self.messenger.edit_text(target, &draft.text).await {
            Ok(()) => DispatchReport {
                edited: 1,
                ..Default::default()
            },
            Err(e) => {
                error!(
                    chat_id = target.chat_id.0,
                    message_id = target.message_id.0,
                    error = %e,
                    "edit message failed"
                );
                DispatchReport {
                    failed: 1,
                    ..Default::default()
                }
            }
        }
    }
}

/// Split into chunks of at most `max_len` characters.
pub fn split_text(s: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut cur_len = 0usize;

    for ch in s.chars() {
        if cur_len >= max_len {
            out.push(std::mem::take(&mut cur));
            cur_len = 0;
        }
        cur.push(ch);
        cur_len += 1;
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::{ChatId, ChatKind};
    use crate::testing::{command, ts, FakeMessenger};

    struct Harness {
        api: Arc<FakeMessenger>,
        registry: Arc<SentMessageRegistry>,
        cache: Arc<EditCache>,
        dispatcher: OutboundDispatcher,
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeMessenger::new());
        let registry = Arc::new(SentMessageRegistry::new(Duration::from_secs(120)));
        let cache = Arc::new(EditCache::new(17));
        let dispatcher =
            OutboundDispatcher::new(api.clone(), registry.clone(), cache.clone(), 4096);
        Harness {
            api,
            registry,
            cache,
            dispatcher,
        }
    }

    #[test]
    fn splits_at_the_limit() {
        let text = "a".repeat(5000);
        let chunks = split_text(&text, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn splits_on_char_boundaries() {
        let chunks = split_text("岛岛岛岛岛", 2);
        assert_eq!(chunks, vec!["岛岛", "岛岛", "岛"]);
    }

    #[tokio::test]
    async fn oversized_draft_goes_out_as_replies_and_is_recorded() {
        let h = harness();
        let cmd = command(-100, 1, "fclist", ts(0));
        let long = format!("{}{}", "x".repeat(4096), "y".repeat(904));

        let report = h
            .dispatcher
            .dispatch(&cmd, None, vec![Draft::text(cmd.chat.id, long)])
            .await;

        assert_eq!(report.sent, 2);
        let sent = h.api.sent_drafts();
        assert_eq!(sent[0].text, "x".repeat(4096));
        assert_eq!(sent[1].text, "y".repeat(904));
        assert!(sent.iter().all(|d| d.reply_to == Some(cmd.message_id)));
        assert_eq!(h.registry.len().await, 2);
        assert_eq!(h.cache.get(&cmd.correlation_key()).map(|v| v.len()), Some(2));
    }

    #[tokio::test]
    async fn single_draft_with_target_edits_in_place() {
        let h = harness();
        let mut cmd = command(-100, 1, "myfc", ts(0));
        cmd.edit_date = Some(ts(3));

        let report = h
            .dispatcher
            .dispatch(
                &cmd,
                Some(MessageId(77)),
                vec![Draft::text(cmd.chat.id, "updated")],
            )
            .await;

        assert_eq!(report.edited, 1);
        assert!(h.api.sent_drafts().is_empty());
        assert_eq!(
            h.api.edits(),
            vec![(MessageRef::new(cmd.chat.id, MessageId(77)), "updated".to_string())]
        );
    }

    #[tokio::test]
    async fn edit_that_outgrows_one_message_replaces_the_reply() {
        let h = harness();
        let cmd = command(-100, 1, "fclist", ts(0));
        h.dispatcher
            .dispatch(&cmd, None, vec![Draft::text(cmd.chat.id, "short")])
            .await;
        let old_id = h.cache.get(&cmd.correlation_key()).unwrap()[0];

        let mut edited = cmd.clone();
        edited.edit_date = Some(ts(5));
        let long = "e".repeat(5000);
        let report = h
            .dispatcher
            .dispatch(&edited, Some(old_id), vec![Draft::text(cmd.chat.id, long.clone())])
            .await;

        assert_eq!(report, DispatchReport { sent: 2, edited: 0, failed: 0 });
        assert!(h.api.edits().is_empty());
        assert_eq!(h.api.deleted(), vec![MessageRef::new(cmd.chat.id, old_id)]);
        let delivered: String = h.api.sent_texts()[1..].concat();
        assert_eq!(delivered, long);

        let ids = h.cache.get(&cmd.correlation_key()).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&old_id));
        assert_eq!(h.registry.len().await, 2);
    }

    #[tokio::test]
    async fn messenger_limits_bound_the_chunk_size_and_edits() {
        let api = Arc::new(FakeMessenger::new().with_max_len(10).without_edits());
        let registry = Arc::new(SentMessageRegistry::new(Duration::from_secs(120)));
        let cache = Arc::new(EditCache::new(17));
        let dispatcher = OutboundDispatcher::new(api.clone(), registry, cache, 4096);

        let mut cmd = command(-100, 1, "fc", ts(0));
        dispatcher
            .dispatch(&cmd, None, vec![Draft::text(cmd.chat.id, "a".repeat(25))])
            .await;
        assert_eq!(
            api.sent_texts().iter().map(|t| t.len()).collect::<Vec<_>>(),
            vec![10, 10, 5]
        );

        cmd.edit_date = Some(ts(3));
        dispatcher
            .dispatch(&cmd, Some(MessageId(1)), vec![Draft::text(cmd.chat.id, "new")])
            .await;
        assert!(api.edits().is_empty());
        assert_eq!(api.deleted(), vec![MessageRef::new(cmd.chat.id, MessageId(1))]);
        assert_eq!(api.sent_texts().last().map(String::as_str), Some("new"));
    }

    #[tokio::test]
    async fn open_and_private_replies_are_not_recorded() {
        let h = harness();
        let open = command(-100, 1, "open", ts(0));
        h.dispatcher
            .dispatch(&open, None, vec![Draft::text(open.chat.id, "island open")])
            .await;

        let mut private = command(1, 1, "myfc", ts(0));
        private.chat.kind = ChatKind::Private;
        h.dispatcher
            .dispatch(&private, None, vec![Draft::text(private.chat.id, "fc")])
            .await;

        assert!(h.registry.is_empty().await);
        // Both still correlate for edits.
        assert!(h.cache.get(&open.correlation_key()).is_some());
        assert!(h.cache.get(&private.correlation_key()).is_some());
    }

    #[tokio::test]
    async fn replies_to_other_chats_are_not_correlated() {
        let h = harness();
        let cmd = command(-100, 1, "login", ts(0));

        h.dispatcher
            .dispatch(&cmd, None, vec![Draft::text(ChatId(1), "your link")])
            .await;

        assert_eq!(h.api.sent_drafts().len(), 1);
        assert!(h.cache.get(&cmd.correlation_key()).is_none());
        assert!(h.registry.is_empty().await);
    }

    #[tokio::test]
    async fn one_failed_chunk_does_not_stop_the_rest() {
        let h = harness();
        h.api.fail_nth_send(1);
        let cmd = command(-100, 1, "fclist", ts(0));
        let long = "z".repeat(4096 * 3);

        let report = h
            .dispatcher
            .dispatch(&cmd, None, vec![Draft::text(cmd.chat.id, long)])
            .await;

        assert_eq!(report, DispatchReport { sent: 2, edited: 0, failed: 1 });
        assert_eq!(h.cache.get(&cmd.correlation_key()).map(|v| v.len()), Some(2));
    }

    #[tokio::test]
    async fn errors_reply_only_when_they_carry_text() {
        let h = harness();
        let cmd = command(-100, 1, "sfc", ts(0));

        h.dispatcher
            .dispatch_error(&cmd, None, CommandError::not_found("user"))
            .await;
        h.dispatcher
            .dispatch_error(&cmd, None, CommandError::other(anyhow::anyhow!("db down")))
            .await;
        assert!(h.api.sent_drafts().is_empty());

        let report = h
            .dispatcher
            .dispatch_error(
                &cmd,
                None,
                CommandError::other(anyhow::anyhow!("bad fc")).with_reply("invalid friend code"),
            )
            .await;
        assert_eq!(report.sent, 1);
        assert_eq!(h.api.sent_texts(), vec!["invalid friend code".to_string()]);
        assert_eq!(h.registry.len().await, 1);
    }
}
