//! Session lifecycle. A session starts whenever the focused `(app_name, window_title)` pair
//! changes, and ends on the next change, on prolonged idleness, or when tracking stops. Sessions
//! that end up shorter than the minimum duration are removed from storage again.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::{
    config::TrackerConfig,
    daemon::{
        collection::{
            activity::ActivitySample,
            classifier::{classify, Classification},
        },
        storage::{
            entities::{EnrichedSample, NewSession, ResourceUsage, SessionClose},
            PersistenceSink,
        },
    },
    window_api::ActiveWindowData,
};

use super::{
    focus::{FocusLog, FocusSession},
    model::{Session, SessionSnapshot},
};

/// Thresholds steering the state machine, all in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub poll_interval: u64,
    pub min_session_duration: u64,
    pub focus_threshold: u64,
    pub idle_session_threshold: u64,
}

impl From<&TrackerConfig> for SessionPolicy {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            poll_interval: config.tracking_interval,
            min_session_duration: config.min_session_duration,
            focus_threshold: config.focus_threshold,
            idle_session_threshold: config.idle_session_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    WindowChanged,
    IdleTimeout,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseOutcome {
    /// Shorter than the minimum duration, removed from storage.
    Discarded { duration: u64 },
    Persisted { duration: u64, promoted: bool },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub closed: Option<(CloseReason, CloseOutcome)>,
    pub opened: bool,
}

pub struct SessionManager {
    policy: SessionPolicy,
    sink: Box<dyn PersistenceSink>,
    current: Option<Session>,
    focus_log: Arc<Mutex<FocusLog>>,
}

impl SessionManager {
    pub fn new(
        policy: SessionPolicy,
        sink: Box<dyn PersistenceSink>,
        focus_log: Arc<Mutex<FocusLog>>,
    ) -> Self {
        Self {
            policy,
            sink,
            current: None,
            focus_log,
        }
    }

    pub fn set_poll_interval(&mut self, seconds: u64) {
        self.policy.poll_interval = seconds;
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.current.as_ref().map(Session::snapshot)
    }

    /// Advances the state machine by one poll. `now` is the single clock reading for the whole
    /// tick, every timestamp written during it derives from that value.
    pub fn tick(
        &mut self,
        now: DateTime<Utc>,
        window: Option<&ActiveWindowData>,
        activity: &ActivitySample,
        resources: ResourceUsage,
    ) -> TickReport {
        let mut report = TickReport::default();

        let unchanged = match (&self.current, window) {
            (Some(session), Some(window)) => session.identity_matches(window),
            (None, None) => true,
            _ => false,
        };

        if !unchanged {
            report.closed = self.close_current(now, CloseReason::WindowChanged);
            if let Some(window) = window {
                self.open(now, window);
                report.opened = true;
            }
        } else if let Some(outcome) = self.account_activity(now, activity) {
            report.closed = Some((CloseReason::IdleTimeout, outcome));
        }

        if let Some(window) = window {
            self.record_sample(now, window, activity, resources);
        }

        report
    }

    /// Closes the open session, if any, as part of stopping the tracker.
    pub fn stop(&mut self, now: DateTime<Utc>) -> Option<CloseOutcome> {
        self.close_current(now, CloseReason::Stopped)
            .map(|(_, outcome)| outcome)
    }

    fn open(&mut self, now: DateTime<Utc>, window: &ActiveWindowData) {
        let classification = classify(&window.app_name, &window.window_title);
        let new_session = NewSession {
            app_name: window.app_name.clone(),
            window_title: window.window_title.clone(),
            started_at: now,
            category: classification.category,
            productivity_score: classification.productivity_score,
        };

        let id = self
            .sink
            .start_session(&new_session)
            .inspect_err(|e| {
                error!(
                    "Failed to store new session {} - {}: {e:?}",
                    window.app_name, window.window_title
                )
            })
            .ok();

        debug!(
            "New session started: {} - {}",
            window.app_name, window.window_title
        );
        self.current = Some(Session {
            id,
            app_name: window.app_name.clone(),
            window_title: window.window_title.clone(),
            start_time: now,
            classification,
            idle_seconds: 0,
            idle_streak: 0,
            activity_count: 0,
        });
    }

    /// Adds one tick worth of idle or active time to the open session. Returns the outcome when
    /// the idle streak forced the session to close.
    fn account_activity(
        &mut self,
        now: DateTime<Utc>,
        activity: &ActivitySample,
    ) -> Option<CloseOutcome> {
        let interval = self.policy.poll_interval;
        let session = self.current.as_mut()?;

        if !activity.is_idle {
            session.idle_streak = 0;
            session.activity_count += 1;
            return None;
        }

        session.idle_seconds += interval;
        session.idle_streak += interval;
        if session.idle_streak <= self.policy.idle_session_threshold {
            return None;
        }

        debug!(
            "Ending session {} - {} due to prolonged idle time",
            session.app_name, session.window_title
        );
        self.close_current(now, CloseReason::IdleTimeout)
            .map(|(_, outcome)| outcome)
    }

    fn close_current(
        &mut self,
        now: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<(CloseReason, CloseOutcome)> {
        let session = self.current.take()?;
        let duration = session.elapsed_seconds(now);

        if duration < self.policy.min_session_duration {
            if let Some(id) = session.id {
                if let Err(e) = self.sink.delete_session(id) {
                    error!("Failed to delete short session {id}: {e:?}");
                }
            }
            debug!(
                "Discarded {duration}s session {} - {} ({reason:?})",
                session.app_name, session.window_title
            );
            return Some((reason, CloseOutcome::Discarded { duration }));
        }

        let close = SessionClose {
            ended_at: now,
            duration_seconds: duration,
            idle_seconds: session.idle_seconds,
            activity_count: session.activity_count,
        };
        if let Some(id) = session.id {
            if let Err(e) = self.sink.end_session(id, &close) {
                error!("Failed to end session {id}: {e:?}");
            }
        }
        debug!(
            "Closed {duration}s session {} - {} ({reason:?})",
            session.app_name, session.window_title
        );

        let promoted = duration >= self.policy.focus_threshold;
        if promoted {
            info!("Focus session recorded: {duration}s in {}", session.app_name);
            self.focus_log
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(FocusSession {
                    id: session.id,
                    app_name: session.app_name,
                    window_title: session.window_title,
                    start_time: session.start_time,
                    end_time: now,
                    duration,
                    activity_count: session.activity_count,
                    idle_seconds: session.idle_seconds,
                });
        }

        Some((reason, CloseOutcome::Persisted { duration, promoted }))
    }

    fn record_sample(
        &mut self,
        now: DateTime<Utc>,
        window: &ActiveWindowData,
        activity: &ActivitySample,
        resources: ResourceUsage,
    ) {
        let classification: Classification = match &self.current {
            Some(session) if session.identity_matches(window) => session.classification.clone(),
            _ => classify(&window.app_name, &window.window_title),
        };

        let sample = EnrichedSample {
            timestamp: now,
            app_name: window.app_name.clone(),
            window_title: window.window_title.clone(),
            category: classification.category,
            productivity_score: classification.productivity_score,
            url: classification.url,
            file_path: classification.file_path,
            activity_intensity: activity.intensity,
            is_idle: activity.is_idle,
            idle_seconds: activity.idle_time.as_secs_f64(),
            resources,
        };
        if let Err(e) = self.sink.record_enriched_sample(&sample) {
            error!("Failed to record activity sample: {e:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{Arc, Mutex},
        time::Duration as StdDuration,
    };

    use anyhow::{anyhow, bail, Result};
    use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

    use super::*;
    use crate::daemon::{
        collection::classifier::Category,
        storage::entities::{SessionId, StoredSession},
    };

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    #[derive(Default)]
    struct MemoryRows {
        next_id: i64,
        sessions: BTreeMap<SessionId, StoredSession>,
        deleted: Vec<SessionId>,
        samples: Vec<EnrichedSample>,
        fail_writes: bool,
    }

    /// In-memory stand-in for the store. Rows stay inspectable through the shared handle.
    #[derive(Clone, Default)]
    struct MemorySink(Arc<Mutex<MemoryRows>>);

    impl MemorySink {
        fn rows(&self) -> std::sync::MutexGuard<'_, MemoryRows> {
            self.0.lock().unwrap()
        }

        fn completed(&self) -> Vec<StoredSession> {
            self.rows()
                .sessions
                .values()
                .filter(|v| !v.is_open())
                .cloned()
                .collect()
        }

        fn open(&self) -> Vec<StoredSession> {
            self.rows()
                .sessions
                .values()
                .filter(|v| v.is_open())
                .cloned()
                .collect()
        }
    }

    impl PersistenceSink for MemorySink {
        fn start_session(&mut self, session: &NewSession) -> Result<SessionId> {
            let mut rows = self.rows();
            if rows.fail_writes {
                bail!("disk is full");
            }
            rows.next_id += 1;
            let id = SessionId(rows.next_id);
            rows.sessions.insert(
                id,
                StoredSession {
                    id,
                    app_name: session.app_name.to_string(),
                    window_title: session.window_title.to_string(),
                    start_time: session.started_at,
                    end_time: None,
                    duration: 0,
                    category: session.category,
                    productivity_score: session.productivity_score,
                    idle_seconds: 0,
                    activity_count: 0,
                },
            );
            Ok(id)
        }

        fn end_session(&mut self, id: SessionId, close: &SessionClose) -> Result<()> {
            let mut rows = self.rows();
            if rows.fail_writes {
                bail!("disk is full");
            }
            let row = rows
                .sessions
                .get_mut(&id)
                .ok_or_else(|| anyhow!("unknown session {id}"))?;
            row.end_time = Some(close.ended_at);
            row.duration = close.duration_seconds;
            row.idle_seconds = close.idle_seconds;
            row.activity_count = close.activity_count;
            Ok(())
        }

        fn delete_session(&mut self, id: SessionId) -> Result<()> {
            let mut rows = self.rows();
            rows.sessions
                .remove(&id)
                .ok_or_else(|| anyhow!("unknown session {id}"))?;
            rows.deleted.push(id);
            Ok(())
        }

        fn record_enriched_sample(&mut self, sample: &EnrichedSample) -> Result<()> {
            let mut rows = self.rows();
            if rows.fail_writes {
                bail!("disk is full");
            }
            rows.samples.push(sample.clone());
            Ok(())
        }
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(seconds)
    }

    fn active() -> ActivitySample {
        ActivitySample {
            idle_time: StdDuration::from_millis(300),
            is_idle: false,
            keyboard_active: true,
            intensity: 0.2,
        }
    }

    fn idle() -> ActivitySample {
        ActivitySample {
            idle_time: StdDuration::from_secs(120),
            is_idle: true,
            keyboard_active: false,
            intensity: 0.0,
        }
    }

    fn window(app: &str, title: &str) -> ActiveWindowData {
        ActiveWindowData::new(app, title)
    }

    struct Harness {
        manager: SessionManager,
        sink: MemorySink,
        focus_log: Arc<Mutex<FocusLog>>,
    }

    impl Harness {
        fn new() -> Self {
            let sink = MemorySink::default();
            let focus_log = Arc::new(Mutex::new(FocusLog::new(16)));
            let manager = SessionManager::new(
                SessionPolicy::from(&TrackerConfig::default()),
                Box::new(sink.clone()),
                focus_log.clone(),
            );
            Self {
                manager,
                sink,
                focus_log,
            }
        }

        /// Polls every 5 seconds in `[from, to)` with the same observation.
        fn hold(
            &mut self,
            from: i64,
            to: i64,
            window: Option<&ActiveWindowData>,
            activity: ActivitySample,
        ) -> Vec<TickReport> {
            (from..to)
                .step_by(5)
                .map(|t| {
                    self.manager
                        .tick(at(t), window, &activity, ResourceUsage::default())
                })
                .collect()
        }

        fn step(&mut self, t: i64, window: &ActiveWindowData) -> TickReport {
            self.manager
                .tick(at(t), Some(window), &active(), ResourceUsage::default())
        }

        fn focus_sessions(&self) -> Vec<FocusSession> {
            self.focus_log.lock().unwrap().since(at(-1))
        }
    }

    fn assert_durations_consistent(sessions: &[StoredSession]) {
        for session in sessions {
            let span = session.span().expect("closed session has an end");
            assert!(span >= Duration::zero());
            assert_eq!(span.num_seconds() as u64, session.duration);
        }
    }

    #[test]
    fn editor_browser_editor_scenario() {
        let mut harness = Harness::new();
        let editor = window("Editor", "file.py");
        let browser = window("Browser", "docs");

        harness.hold(0, 40, Some(&editor), active());
        harness.hold(40, 50, Some(&browser), active());
        harness.hold(50, 85, Some(&editor), active());
        let stopped = harness.manager.stop(at(85));

        assert_eq!(
            stopped,
            Some(CloseOutcome::Persisted {
                duration: 35,
                promoted: false
            })
        );
        let completed = harness.sink.completed();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].app_name, "Editor");
        assert_eq!(completed[0].duration, 40);
        assert_eq!(completed[1].app_name, "Editor");
        assert_eq!(completed[1].duration, 35);
        assert_eq!(harness.sink.rows().deleted.len(), 1);
        assert!(harness.sink.open().is_empty());
        assert!(harness.focus_sessions().is_empty());
        assert_durations_consistent(&completed);
    }

    #[test]
    fn stable_window_keeps_one_session() {
        let mut harness = Harness::new();
        let editor = window("code", "main.rs");

        let reports = harness.hold(0, 100, Some(&editor), active());

        assert!(reports[0].opened);
        assert!(reports[1..].iter().all(|v| !v.opened && v.closed.is_none()));
        assert_eq!(harness.sink.rows().sessions.len(), 1);
        assert_eq!(harness.manager.current().map(|v| v.activity_count), Some(19));
    }

    #[test]
    fn short_sessions_are_never_stored() {
        let mut harness = Harness::new();
        let a = window("a", "");
        let b = window("b", "");

        harness.hold(0, 25, Some(&a), active());
        let report = harness.manager.tick(at(25), Some(&b), &active(), ResourceUsage::default());

        assert_eq!(
            report.closed,
            Some((
                CloseReason::WindowChanged,
                CloseOutcome::Discarded { duration: 25 }
            ))
        );
        assert!(harness.sink.completed().is_empty());
        assert_eq!(harness.sink.open().len(), 1);
    }

    #[test]
    fn title_change_starts_new_session() {
        let mut harness = Harness::new();
        harness.hold(0, 60, Some(&window("code", "a.rs")), active());
        let report = harness.manager.tick(
            at(60),
            Some(&window("code", "b.rs")),
            &active(),
            ResourceUsage::default(),
        );

        assert!(report.opened);
        assert!(matches!(
            report.closed,
            Some((CloseReason::WindowChanged, CloseOutcome::Persisted { duration: 60, .. }))
        ));
        assert_eq!(harness.manager.current().unwrap().window_title.as_ref(), "b.rs");
    }

    #[test]
    fn missing_window_closes_session() {
        let mut harness = Harness::new();
        harness.hold(0, 45, Some(&window("code", "a.rs")), active());
        let report = harness.manager.tick(at(45), None, &active(), ResourceUsage::default());

        assert!(!report.opened);
        assert!(report.closed.is_some());
        assert!(harness.manager.current().is_none());

        let report = harness.manager.tick(at(50), None, &active(), ResourceUsage::default());
        assert_eq!(report, TickReport::default());
    }

    #[test]
    fn focus_promotion_starts_at_threshold() {
        let mut harness = Harness::new();
        let editor = window("code", "lib.rs");
        let other = window("slack", "general");

        harness.hold(0, 299, Some(&editor), active());
        let short = harness.step(299, &other);
        assert!(matches!(
            short.closed,
            Some((_, CloseOutcome::Persisted { duration: 299, promoted: false }))
        ));

        harness.hold(299, 599, Some(&other), active());
        let long = harness.step(599, &editor);
        assert!(matches!(
            long.closed,
            Some((_, CloseOutcome::Persisted { duration: 300, promoted: true }))
        ));

        let focus = harness.focus_sessions();
        assert_eq!(focus.len(), 1);
        assert_eq!(focus[0].app_name.as_ref(), "slack");
        assert_eq!(focus[0].duration, 300);
        assert_eq!(focus[0].end_time, at(599));
    }

    #[test]
    fn idle_timeout_splits_session() {
        let mut harness = Harness::new();
        let video = window("Video", "clip.mp4");

        let reports = harness.hold(0, 190, Some(&video), idle());
        let forced = reports
            .iter()
            .position(|v| v.closed.is_some())
            .expect("idle timeout closes the session");
        // 37 idle ticks of 5s accumulate 185s, the first total above 180s.
        assert_eq!(forced, 37);
        assert_eq!(
            reports[forced].closed,
            Some((
                CloseReason::IdleTimeout,
                CloseOutcome::Persisted {
                    duration: 185,
                    promoted: false
                }
            ))
        );
        assert!(harness.manager.current().is_none());

        // The user comes back to the same window.
        let reports = harness.hold(190, 250, Some(&video), active());
        assert!(reports[0].opened);
        harness.manager.stop(at(250));

        let completed = harness.sink.completed();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed[0].app_name, completed[1].app_name);
        assert_eq!(completed[0].window_title, completed[1].window_title);
        assert_eq!(completed[0].idle_seconds, 185);
        assert_eq!(completed[1].start_time, at(190));
        assert_eq!(completed[1].duration, 60);
        assert_durations_consistent(&completed);
    }

    #[test]
    fn continuous_idle_reopens_fresh_session() {
        let mut harness = Harness::new();
        let video = window("Video", "clip.mp4");

        let reports = harness.hold(0, 205, Some(&video), idle());

        assert_eq!(reports.iter().filter(|v| v.closed.is_some()).count(), 1);
        assert_eq!(reports.iter().filter(|v| v.opened).count(), 2);
        let current = harness.manager.current().expect("session reopened");
        assert_eq!(current.start_time, at(190));
        assert_eq!(current.idle_seconds, 10);
    }

    #[test]
    fn activity_resets_idle_streak() {
        let mut harness = Harness::new();
        let editor = window("code", "main.rs");

        harness.hold(0, 150, Some(&editor), idle());
        harness.hold(150, 155, Some(&editor), active());
        let reports = harness.hold(155, 300, Some(&editor), idle());

        assert!(reports.iter().all(|v| v.closed.is_none()));
        let current = harness.manager.current().unwrap();
        assert_eq!(current.idle_streak, 145);
        assert_eq!(current.idle_seconds, 145 + 145);
        assert_eq!(current.activity_count, 1);
    }

    #[test]
    fn stop_closes_open_session() {
        let mut harness = Harness::new();
        harness.hold(0, 90, Some(&window("code", "main.rs")), active());

        let outcome = harness.manager.stop(at(90));

        assert_eq!(
            outcome,
            Some(CloseOutcome::Persisted {
                duration: 90,
                promoted: false
            })
        );
        let completed = harness.sink.completed();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].duration, 90);
        assert!(harness.sink.open().is_empty());
        assert_eq!(harness.manager.stop(at(95)), None);
    }

    #[test]
    fn samples_follow_focused_window() {
        let mut harness = Harness::new();
        let browser = window("firefox", "rust-lang/rust - GitHub");

        harness.hold(0, 15, Some(&browser), active());
        harness.hold(15, 25, None, active());

        let rows = harness.sink.rows();
        assert_eq!(rows.samples.len(), 3);
        assert!(rows
            .samples
            .iter()
            .all(|v| v.category == Category::Development && v.productivity_score == 0.9));
        assert_eq!(rows.samples[2].timestamp, at(10));
    }

    #[test]
    fn storage_failures_do_not_stop_the_state_machine() {
        let mut harness = Harness::new();
        harness.sink.rows().fail_writes = true;

        let editor = window("code", "main.rs");
        harness.hold(0, 60, Some(&editor), active());
        assert!(harness.manager.current().is_some_and(|v| v.id.is_none()));

        harness.sink.rows().fail_writes = false;
        let report = harness.step(60, &window("slack", ""));

        assert!(matches!(
            report.closed,
            Some((_, CloseOutcome::Persisted { duration: 60, .. }))
        ));
        assert!(harness.manager.current().is_some_and(|v| v.id.is_some()));
        assert!(harness.sink.completed().is_empty());
    }
}
