use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};

use crate::domain::UserId;

/// Where a multi-step `/send` stands for one user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingInput {
    AwaitingTargetId,
    AwaitingMessageBody { target: UserId },
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    input: PendingInput,
    since: DateTime<Utc>,
}

/// Per-user pending-input states with expiry.
#[derive(Debug)]
pub struct ConversationStore {
    timeout: Duration,
    entries: HashMap<UserId, Entry>,
}

impl ConversationStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            entries: HashMap::new(),
        }
    }

    pub fn begin(&mut self, user: UserId, input: PendingInput, now: DateTime<Utc>) {
        self.entries.insert(user, Entry { input, since: now });
    }

    /// Current state, or `None` if absent or expired (expired entries are dropped).
    pub fn current(&mut self, user: UserId, now: DateTime<Utc>) -> Option<PendingInput> {
        let entry = *self.entries.get(&user)?;
        if self.is_expired(&entry, now) {
            self.entries.remove(&user);
            return None;
        }
        Some(entry.input)
    }

    pub fn cancel(&mut self, user: UserId) -> bool {
        self.entries.remove(&user).is_some()
    }

    pub fn sweep(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        let timeout = self.timeout;
        self.entries
            .retain(|_, e| !expired_after(e.since, now, timeout));
        before - self.entries.len()
    }

    fn is_expired(&self, entry: &Entry, now: DateTime<Utc>) -> bool {
        expired_after(entry.since, now, self.timeout)
    }
}

fn expired_after(since: DateTime<Utc>, now: DateTime<Utc>, timeout: Duration) -> bool {
    match chrono::Duration::from_std(timeout) {
        Ok(t) => now.signed_duration_since(since) >= t,
        Err(_) => false,
    }
}
