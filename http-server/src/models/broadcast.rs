use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const BROADCAST_HISTORY: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastRecord {
    pub id: u64,
    pub message: String,
    pub delivered: usize,
    pub sent_at: DateTime<Utc>,
}

struct History {
    next_id: u64,
    entries: VecDeque<BroadcastRecord>,
}

// Most recent operator broadcasts, oldest dropped first
#[derive(Clone)]
pub struct BroadcastLog {
    history: Arc<Mutex<History>>,
    capacity: usize,
}

impl Default for BroadcastLog {
    fn default() -> Self {
        Self::new(BROADCAST_HISTORY)
    }
}

impl BroadcastLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(History {
                next_id: 1,
                entries: VecDeque::with_capacity(capacity),
            })),
            capacity: capacity.max(1),
        }
    }

    // Records are pushed whole, so a poisoned log is still consistent
    fn history(&self) -> MutexGuard<'_, History> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(
        &self,
        message: &str,
        delivered: usize,
        sent_at: DateTime<Utc>,
    ) -> BroadcastRecord {
        let mut history = self.history();
        let record = BroadcastRecord {
            id: history.next_id,
            message: message.to_string(),
            delivered,
            sent_at,
        };
        history.next_id += 1;
        if history.entries.len() == self.capacity {
            history.entries.pop_front();
        }
        history.entries.push_back(record.clone());
        record
    }

    /// Newest first
    pub fn recent(&self) -> Vec<BroadcastRecord> {
        self.history().entries.iter().rev().cloned().collect()
    }
}
