use std::{fmt::Display, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::daemon::collection::classifier::Category;

/// Opaque handle of a stored session. Assigned by the [PersistenceSink](super::PersistenceSink).
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionId(pub i64);

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything known about a session at the moment it is opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub started_at: DateTime<Utc>,
    pub category: Category,
    pub productivity_score: f64,
}

/// Final accounting of a session that met the minimum duration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClose {
    pub ended_at: DateTime<Utc>,
    /// Whole seconds between start and `ended_at`.
    pub duration_seconds: u64,
    pub idle_seconds: u64,
    pub activity_count: u64,
}

/// Resources consumed by every process sharing the focused application's name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub process_count: usize,
}

/// A per-tick observation of the focused window, recorded regardless of session boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSample {
    pub timestamp: DateTime<Utc>,
    pub app_name: Arc<str>,
    pub window_title: Arc<str>,
    pub category: Category,
    pub productivity_score: f64,
    pub url: Option<String>,
    pub file_path: Option<String>,
    pub activity_intensity: f64,
    pub is_idle: bool,
    pub idle_seconds: f64,
    pub resources: ResourceUsage,
}

/// A session row as it is kept by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub id: SessionId,
    pub app_name: String,
    pub window_title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: u64,
    pub category: Category,
    pub productivity_score: f64,
    pub idle_seconds: u64,
    pub activity_count: u64,
}

impl StoredSession {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Elapsed time according to the stored timestamps, `None` while the session is open.
    pub fn span(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
