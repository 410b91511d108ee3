//! Bookkeeping of the bot's own replies in group chats, so they can be
//! purged once they are no longer useful.

use std::{cmp::Reverse, collections::BinaryHeap, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, MessageId, MessageRef},
    freshness::older_than,
    messaging::port::MessagingPort,
};

/// Ordered by send time first so the heap yields the oldest reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct SentMessageRecord {
    pub sent_at: DateTime<Utc>,
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl SentMessageRecord {
    pub fn message_ref(&self) -> MessageRef {
        MessageRef::new(self.chat_id, self.message_id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.deleted + self.failed
    }
}

pub struct SentMessageRegistry {
    records: Mutex<BinaryHeap<Reverse<SentMessageRecord>>>,
    retention: Duration,
}

impl SentMessageRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            records: Mutex::new(BinaryHeap::new()),
            retention,
        }
    }

    pub async fn record(&self, chat_id: ChatId, message_id: MessageId, sent_at: DateTime<Utc>) {
        self.records.lock().await.push(Reverse(SentMessageRecord {
            sent_at,
            chat_id,
            message_id,
        }));
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    /// Pop every record older than the retention window, oldest first.
    ///
    /// Stops at the first record still inside the window.
    pub async fn take_stale(&self, now: DateTime<Utc>) -> Vec<SentMessageRecord> {
        let mut heap = self.records.lock().await;
        let mut stale = Vec::new();
        while let Some(Reverse(oldest)) = heap.peek() {
            if !older_than(oldest.sent_at, now, self.retention) {
                break;
            }
            if let Some(Reverse(rec)) = heap.pop() {
                stale.push(rec);
            }
        }
        stale
    }

    /// Remove every record for one chat regardless of age.
    pub async fn take_chat(&self, chat_id: ChatId) -> Vec<SentMessageRecord> {
        let mut heap = self.records.lock().await;
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *heap)
            .into_iter()
            .partition(|Reverse(rec)| rec.chat_id == chat_id);
        *heap = kept.into_iter().collect();

        let mut taken: Vec<SentMessageRecord> =
            taken.into_iter().map(|Reverse(rec)| rec).collect();
        taken.sort();
        taken
    }

    /// Drop records for replies that were already deleted elsewhere.
    pub async fn forget(&self, chat_id: ChatId, message_ids: &[MessageId]) {
        if message_ids.is_empty() {
            return;
        }
        let mut heap = self.records.lock().await;
        heap.retain(|Reverse(rec)| {
            rec.chat_id != chat_id || !message_ids.contains(&rec.message_id)
        });
    }

    /// Delete stale replies from the platform and forget them.
    ///
    /// Delete failures are logged; the record is dropped either way so a
    /// message that can no longer be deleted is not retried forever.
    pub async fn sweep(&self, now: DateTime<Utc>, messenger: &dyn MessagingPort) -> SweepReport {
        let stale = self.take_stale(now).await;
        if stale.is_empty() {
            return SweepReport::default();
        }
        let report = delete_records(&stale, messenger).await;
        let remaining = self.len().await;
        info!(
            deleted = report.deleted,
            failed = report.failed,
            remaining,
            "swept stale replies"
        );
        report
    }

    /// Delete every tracked reply in `chat_id` right away.
    pub async fn purge_chat(&self, chat_id: ChatId, messenger: &dyn MessagingPort) -> SweepReport {
        let records = self.take_chat(chat_id).await;
        let report = delete_records(&records, messenger).await;
        info!(
            chat_id = chat_id.0,
            deleted = report.deleted,
            failed = report.failed,
            "purged chat replies"
        );
        report
    }
}

/// Delete `records` from the platform, oldest first.
///
/// Records are expected to be already taken out of the registry.
pub async fn delete_records(
    records: &[SentMessageRecord],
    messenger: &dyn MessagingPort,
) -> SweepReport {
    let mut report = SweepReport::default();
    for rec in records {
        match messenger.delete_message(rec.message_ref()).await {
            Ok(()) => {
                debug!(chat_id = rec.chat_id.0, message_id = rec.message_id.0, "deleted reply");
                report.deleted += 1;
            }
            Err(e) => {
                warn!(
                    chat_id = rec.chat_id.0,
                    message_id = rec.message_id.0,
                    error = %e,
                    "failed to delete reply"
                );
                report.failed += 1;
            }
        }
    }
    report
}
