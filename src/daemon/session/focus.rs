use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::daemon::storage::entities::SessionId;

/// A closed session long enough to count as sustained work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSession {
    pub id: Option<SessionId>,
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration: u64,
    pub activity_count: u64,
    pub idle_seconds: u64,
}

/// Bounded history of recent focus sessions. The oldest entry is evicted once full.
#[derive(Debug, Clone)]
pub struct FocusLog {
    entries: VecDeque<FocusSession>,
    capacity: usize,
}

impl FocusLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, session: FocusSession) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(session);
    }

    /// Sessions that started at or after `cutoff`, oldest first.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<FocusSession> {
        self.entries
            .iter()
            .filter(|v| v.start_time >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
