use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    config::TrackerConfig,
    daemon::{
        collection::{
            activity::ActivityMonitor,
            afk::AfkEvaluator,
            collector::{DataCollectionModule, SharedObserver},
            resources::ResourceSampler,
        },
        session::{
            focus::{FocusLog, FocusSession},
            manager::{SessionManager, SessionPolicy},
            model::{SessionSnapshot, SessionStats},
        },
        storage::PersistenceSink,
    },
    error::ConfigError,
    utils::clock::Clock,
    window_api::{ActiveWindowData, InputProbe, WindowObserver},
};

/// How long [ActivityTracker::stop_tracking] waits for the loop to wind down.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

struct RunningLoop {
    handle: JoinHandle<DataCollectionModule>,
    shutdown: CancellationToken,
}

/// Control surface of the tracking engine. All collaborators are injected, there is no global
/// state, so any number of trackers can coexist in one process.
pub struct ActivityTracker {
    focus_threshold: u64,
    observer: SharedObserver,
    clock: Arc<dyn Clock>,
    paused: Arc<AtomicBool>,
    current: watch::Receiver<Option<SessionSnapshot>>,
    focus_log: Arc<Mutex<FocusLog>>,
    /// The loop lives here while tracking is stopped.
    parked: Option<DataCollectionModule>,
    running: Option<RunningLoop>,
}

impl ActivityTracker {
    pub fn new(
        config: &TrackerConfig,
        observer: Box<dyn WindowObserver>,
        probe: Box<dyn InputProbe>,
        sink: Box<dyn PersistenceSink>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let observer: SharedObserver = Arc::new(Mutex::new(observer));
        let focus_log = Arc::new(Mutex::new(FocusLog::new(config.focus_history_limit)));
        let paused = Arc::new(AtomicBool::new(!config.tracking_enabled));
        let (snapshot, current) = watch::channel(None);

        let sessions = SessionManager::new(SessionPolicy::from(config), sink, focus_log.clone());
        let collector = DataCollectionModule::new(
            observer.clone(),
            ActivityMonitor::new(probe, AfkEvaluator::from_seconds(config.idle_threshold)),
            config.sample_resources.then(ResourceSampler::new),
            sessions,
            snapshot,
            paused.clone(),
            config.interval(),
            clock.clone(),
        );

        Ok(Self {
            focus_threshold: config.focus_threshold,
            observer,
            clock,
            paused,
            current,
            focus_log,
            parked: Some(collector),
            running: None,
        })
    }

    /// Spawns the polling loop on the current tokio runtime. `interval` must be a whole, non-zero
    /// number of seconds.
    pub fn start_tracking(&mut self, interval: Duration) -> Result<()> {
        if interval < Duration::from_secs(1) {
            return Err(ConfigError::ZeroInterval.into());
        }
        // Idle time is accounted in whole polling periods.
        if interval.subsec_nanos() != 0 {
            return Err(ConfigError::FractionalInterval(interval).into());
        }
        if let Some(running) = &self.running {
            if running.shutdown.is_cancelled() {
                bail!("The previous tracking loop is still shutting down");
            }
            warn!("Tracking is already running");
            return Ok(());
        }
        let Some(mut collector) = self.parked.take() else {
            bail!("The tracking loop was lost after a failure, create a new tracker");
        };

        collector.set_frequency(interval);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            collector
                .run(shutdown.clone())
                .instrument(info_span!("tracking")),
        );
        self.running = Some(RunningLoop { handle, shutdown });
        info!("Tracking started, polling every {}s", interval.as_secs());
        Ok(())
    }

    /// Stops the loop. The open session is closed through the regular closing rules before the
    /// loop exits. Gives up after [STOP_JOIN_TIMEOUT], a later call retries the wait.
    pub async fn stop_tracking(&mut self) {
        let Some(mut running) = self.running.take() else {
            debug!("Tracking is not running");
            return;
        };
        running.shutdown.cancel();

        match tokio::time::timeout(STOP_JOIN_TIMEOUT, &mut running.handle).await {
            Ok(Ok(collector)) => {
                self.parked = Some(collector);
                info!("Tracking stopped");
            }
            Ok(Err(e)) => error!("Tracking loop failed {e:?}"),
            Err(_) => {
                warn!("Tracking loop didn't stop within {STOP_JOIN_TIMEOUT:?}");
                self.running = Some(running);
            }
        }
    }

    pub fn pause_tracking(&self) {
        self.paused.store(true, Ordering::Relaxed);
        info!("Tracking paused");
    }

    pub fn resume_tracking(&self) {
        self.paused.store(false, Ordering::Relaxed);
        info!("Tracking resumed");
    }

    pub fn is_tracking(&self) -> bool {
        let alive = self
            .running
            .as_ref()
            .is_some_and(|v| !v.shutdown.is_cancelled() && !v.handle.is_finished());
        alive && !self.paused.load(Ordering::Relaxed)
    }

    /// Probes the platform directly, independently of the loop.
    pub fn get_current_window(&self) -> Option<ActiveWindowData> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_active_window()
            .inspect_err(|e| debug!("Failed to read active window {e:?}"))
            .ok()
            .flatten()
    }

    pub fn get_session_stats(&self) -> Option<SessionStats> {
        let now = self.clock.time();
        self.current
            .borrow()
            .as_ref()
            .map(|v| v.stats_at(now, self.focus_threshold))
    }

    /// Focus sessions that started within the last `since_days` days, oldest first.
    pub fn get_focus_sessions(&self, since_days: u32) -> Vec<FocusSession> {
        let cutoff = self.clock.time() - chrono::Duration::days(since_days.into());
        self.focus_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .since(cutoff)
    }
}

impl Drop for ActivityTracker {
    fn drop(&mut self) {
        if let Some(running) = &self.running {
            running.shutdown.cancel();
        }
    }
}
