use std::{collections::VecDeque, time::Duration};

use chrono::{DateTime, Utc};

use crate::domain::UserId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRecord {
    pub sender: UserId,
    pub display_name: String,
    pub kind: &'static str,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn render(&self) -> String {
        format!(
            "[{}] {} (ID:{}) {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.display_name,
            self.sender,
            self.kind,
            self.summary
        )
    }
}

/// Bounded in-memory log of relayed messages. Oldest records fall off first.
#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    retention: Duration,
    records: VecDeque<HistoryRecord>,
}

impl HistoryLog {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            retention,
            records: VecDeque::new(),
        }
    }

    pub fn record(&mut self, rec: HistoryRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(rec);
    }

    /// Records newer than the retention window, optionally for one sender, oldest first.
    pub fn query(&self, sender: Option<UserId>, now: DateTime<Utc>) -> Vec<HistoryRecord> {
        let horizon = chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        self.records
            .iter()
            .filter(|r| r.timestamp > horizon)
            .filter(|r| sender.map_or(true, |s| r.sender == s))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
