use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    daemon::{collection::classifier::Classification, storage::entities::SessionId},
    window_api::ActiveWindowData,
};

/// The session currently holding focus. Lives only in memory until it is closed.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// `None` when the store failed to create the row. Accounting continues regardless.
    pub id: Option<SessionId>,
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub start_time: DateTime<Utc>,
    pub classification: Classification,
    /// Total idle seconds observed while this session was focused.
    pub idle_seconds: u64,
    /// Consecutive idle seconds, reset by any active tick.
    pub idle_streak: u64,
    pub activity_count: u64,
}

impl Session {
    pub fn identity_matches(&self, window: &ActiveWindowData) -> bool {
        self.app_name == window.app_name && self.window_title == window.window_title
    }

    /// Whole seconds elapsed at `now`. Never negative, even if the clock went backwards.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        elapsed_seconds(self.start_time, now)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            app_name: self.app_name.clone(),
            window_title: self.window_title.clone(),
            start_time: self.start_time,
            activity_count: self.activity_count,
            idle_seconds: self.idle_seconds,
        }
    }
}

pub fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    (now - start).num_seconds().max(0) as u64
}

/// Copy of the open session handed to readers outside the polling loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub start_time: DateTime<Utc>,
    pub activity_count: u64,
    pub idle_seconds: u64,
}

impl SessionSnapshot {
    pub fn stats_at(&self, now: DateTime<Utc>, focus_threshold: u64) -> SessionStats {
        let duration_so_far = elapsed_seconds(self.start_time, now);
        SessionStats {
            app_name: self.app_name.clone(),
            window_title: self.window_title.clone(),
            duration_so_far,
            activity_count: self.activity_count,
            idle_seconds: self.idle_seconds,
            is_focus_session: duration_so_far >= focus_threshold,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub duration_so_far: u64,
    pub activity_count: u64,
    pub idle_seconds: u64,
    pub is_focus_session: bool,
}
