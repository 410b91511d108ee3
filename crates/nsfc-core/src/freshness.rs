//! Staleness bounds for command messages.
//!
//! Old commands (including a backlog replayed after a restart) are dropped
//! before routing.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::update::CommandMessage;

#[derive(Clone, Copy, Debug)]
pub struct FreshnessPolicy {
    /// Max age of a new (never edited) command.
    pub new_max_age: Duration,
    /// Max age of the original send time of an edited command.
    pub edited_origin_max_age: Duration,
    /// Max age of the edit itself.
    pub edit_max_age: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            new_max_age: Duration::from_secs(30),
            edited_origin_max_age: Duration::from_secs(120),
            edit_max_age: Duration::from_secs(30),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    StaleMessage,
    StaleOrigin,
    StaleEdit,
}

impl Freshness {
    pub fn is_fresh(self) -> bool {
        matches!(self, Freshness::Fresh)
    }
}

impl FreshnessPolicy {
    pub fn check(&self, cmd: &CommandMessage, now: DateTime<Utc>) -> Freshness {
        match cmd.edit_date {
            None => {
                if older_than(cmd.date, now, self.new_max_age) {
                    Freshness::StaleMessage
                } else {
                    Freshness::Fresh
                }
            }
            Some(edited) => {
                if older_than(cmd.date, now, self.edited_origin_max_age) {
                    Freshness::StaleOrigin
                } else if older_than(edited, now, self.edit_max_age) {
                    Freshness::StaleEdit
                } else {
                    Freshness::Fresh
                }
            }
        }
    }
}

/// Strictly older: a message exactly `max_age` old is still fresh.
pub(crate) fn older_than(ts: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match (now - ts).to_std() {
        Ok(age) => age > max_age,
        // Timestamp in the future (clock skew): treat as brand new.
        Err(_) => false,
    }
}
