//! Correlates a command with the replies sent for it, so that editing the
//! command can update (or replace) those replies instead of piling up new ones.

use std::fmt;

use chrono::{DateTime, Utc};
use moka::{policy::EvictionPolicy, sync::Cache};

use crate::domain::{ChatId, MessageId, UserId};

/// Identity of one logical command: edits keep the original send time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub sent_at: i64,
}

impl CorrelationKey {
    pub fn new(chat_id: ChatId, user_id: UserId, sent_at: DateTime<Utc>) -> Self {
        Self {
            chat_id,
            user_id,
            sent_at: sent_at.timestamp(),
        }
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.chat_id.0, self.user_id.0, self.sent_at)
    }
}

/// What an incoming edit should do with the replies already sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditTarget {
    /// Nothing cached: answer like a new command.
    None,
    /// One prior reply: edit it in place.
    Single(MessageId),
    /// Split reply: these must be deleted before answering again.
    Ambiguous(Vec<MessageId>),
}

/// LRU-bounded `CorrelationKey -> [MessageId]` map.
///
/// Internally synchronized; shared across workers behind an `Arc`.
pub struct EditCache {
    inner: Cache<CorrelationKey, Vec<MessageId>>,
}

impl EditCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    pub fn get(&self, key: &CorrelationKey) -> Option<Vec<MessageId>> {
        self.inner.get(key)
    }

    /// Overwrites any previous entry. Empty id lists are not stored.
    pub fn put(&self, key: CorrelationKey, ids: Vec<MessageId>) {
        if ids.is_empty() {
            return;
        }
        self.inner.insert(key, ids);
        // Apply evictions now so the capacity bound holds after every write.
        self.inner.run_pending_tasks();
    }

    pub fn remove(&self, key: &CorrelationKey) {
        self.inner.invalidate(key);
        self.inner.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.inner.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Classify the cached replies for an edited command.
    ///
    /// Ambiguous entries are removed here; the caller deletes the messages.
    pub fn take_edit_target(&self, key: &CorrelationKey) -> EditTarget {
        match self.get(key) {
            None => EditTarget::None,
            Some(ids) => match ids.as_slice() {
                [] => EditTarget::None,
                [only] => EditTarget::Single(*only),
                _ => {
                    self.remove(key);
                    EditTarget::Ambiguous(ids)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ts;

    fn key(n: i64) -> CorrelationKey {
        CorrelationKey::new(ChatId(-100), UserId(n), ts(0))
    }

    #[test]
    fn key_is_stable_and_renders_like_chat_user_unix() {
        let a = CorrelationKey::new(ChatId(-5), UserId(9), ts(42));
        let b = CorrelationKey::new(ChatId(-5), UserId(9), ts(42));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), format!("-5:9:{}", ts(42).timestamp()));
        assert_ne!(a, CorrelationKey::new(ChatId(-6), UserId(9), ts(42)));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache = EditCache::new(3);
        for n in 0..20 {
            cache.put(key(n), vec![MessageId(n as i32)]);
        }
        assert!(cache.len() <= 3);
        assert_eq!(cache.get(&key(19)), Some(vec![MessageId(19)]));
    }

    #[test]
    fn edit_target_by_entry_shape() {
        let cache = EditCache::new(17);
        assert_eq!(cache.take_edit_target(&key(1)), EditTarget::None);

        cache.put(key(1), vec![MessageId(10)]);
        assert_eq!(cache.take_edit_target(&key(1)), EditTarget::Single(MessageId(10)));
        // Single entries survive the lookup.
        assert!(cache.get(&key(1)).is_some());

        cache.put(key(2), vec![MessageId(20), MessageId(21)]);
        assert_eq!(
            cache.take_edit_target(&key(2)),
            EditTarget::Ambiguous(vec![MessageId(20), MessageId(21)])
        );
        assert!(cache.get(&key(2)).is_none());
    }

    #[test]
    fn empty_puts_are_ignored() {
        let cache = EditCache::new(17);
        cache.put(key(1), vec![]);
        assert!(cache.get(&key(1)).is_none());
    }
}
