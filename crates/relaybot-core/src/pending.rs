use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;

use crate::{
    domain::{MessageRef, UserId},
    messaging::types::Payload,
};

/// Composite key of a relayed message: who sent it and when (ISO-8601, millisecond precision).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub sender: UserId,
    pub timestamp: String,
}

impl PendingKey {
    pub fn new(sender: UserId, at: DateTime<Utc>) -> Self {
        Self {
            sender,
            timestamp: iso_key(at),
        }
    }
}

/// Timestamp form used in keys and callback data. Contains no `_`.
pub fn iso_key(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    Delete,
    Resend,
}

impl CallbackAction {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Resend => "resend",
        }
    }
}

/// `delete_<sender>_<timestamp>` / `resend_<sender>_<timestamp>`.
pub fn callback_data(action: CallbackAction, key: &PendingKey) -> String {
    format!("{}_{}_{}", action.as_str(), key.sender.0, key.timestamp)
}

pub fn parse_callback_data(data: &str) -> Option<(CallbackAction, PendingKey)> {
    static PATTERN: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^(delete|resend)_(-?\d+)_([0-9T:.\-+Z]+)$").expect("static regex")
    });

    let caps = re.captures(data.trim())?;
    let action = match &caps[1] {
        "delete" => CallbackAction::Delete,
        _ => CallbackAction::Resend,
    };
    let sender = caps[2].parse::<i64>().ok()?;
    Some((
        action,
        PendingKey {
            sender: UserId(sender),
            timestamp: caps[3].to_string(),
        },
    ))
}

/// The last relayed message of a sender, kept for delete/resend.
#[derive(Clone, Debug)]
pub struct PendingAction {
    pub key: PendingKey,
    pub payload: Payload,
    pub primary_target: UserId,
    /// Copies delivered to targets; deleted best-effort on `delete`.
    pub forwarded: Vec<MessageRef>,
    /// The confirmation shown to the sender; edited on `delete`.
    pub confirmation: Option<MessageRef>,
}

/// The last relayed message of each sender.
///
/// Recording a new message replaces the sender's previous record, so buttons under older
/// confirmations answer "not found". Keys are unique per sender even when two messages
/// carry the same timestamp.
#[derive(Debug, Default)]
pub struct PendingActionStore {
    records: HashMap<UserId, PendingAction>,
    last_issued: HashMap<UserId, DateTime<Utc>>,
}

impl PendingActionStore {
    /// Key for a message received at `at`, bumped 1 ms past the sender's previous key
    /// when needed.
    pub fn next_key(&mut self, sender: UserId, at: DateTime<Utc>) -> PendingKey {
        let at = match self.last_issued.get(&sender) {
            Some(last) if at <= *last => *last + chrono::Duration::milliseconds(1),
            _ => at,
        };
        self.last_issued.insert(sender, at);
        PendingKey::new(sender, at)
    }

    pub fn record(&mut self, action: PendingAction) {
        self.records.insert(action.key.sender, action);
    }

    pub fn get(&self, key: &PendingKey) -> Option<&PendingAction> {
        self.records.get(&key.sender).filter(|r| r.key == *key)
    }

    pub fn get_mut(&mut self, key: &PendingKey) -> Option<&mut PendingAction> {
        self.records
            .get_mut(&key.sender)
            .filter(|r| r.key == *key)
    }

    pub fn remove(&mut self, key: &PendingKey) -> Option<PendingAction> {
        self.get(key)?;
        self.records.remove(&key.sender)
    }

    pub fn set_confirmation(&mut self, key: &PendingKey, msg: MessageRef) {
        if let Some(rec) = self.get_mut(key) {
            rec.confirmation = Some(msg);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
