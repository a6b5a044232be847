use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, trace};

use crate::{
    daemon::{
        session::{
            manager::{CloseOutcome, SessionManager, TickReport},
            model::SessionSnapshot,
        },
        storage::entities::ResourceUsage,
    },
    utils::clock::Clock,
    window_api::{ActiveWindowData, WindowObserver},
};

use super::{activity::ActivityMonitor, resources::ResourceSampler};

/// The observer is shared so the window can also be queried outside of the polling loop.
pub type SharedObserver = Arc<Mutex<Box<dyn WindowObserver>>>;

/// The polling loop. Every tick observes the focused window and input state, feeds them to the
/// [SessionManager] and publishes a snapshot of the open session.
pub struct DataCollectionModule {
    observer: SharedObserver,
    activity: ActivityMonitor,
    resources: Option<ResourceSampler>,
    sessions: SessionManager,
    snapshot: watch::Sender<Option<SessionSnapshot>>,
    paused: Arc<AtomicBool>,
    collection_frequency: Duration,
    time_provider: Arc<dyn Clock>,
}

impl DataCollectionModule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        observer: SharedObserver,
        activity: ActivityMonitor,
        resources: Option<ResourceSampler>,
        sessions: SessionManager,
        snapshot: watch::Sender<Option<SessionSnapshot>>,
        paused: Arc<AtomicBool>,
        collection_frequency: Duration,
        time_provider: Arc<dyn Clock>,
    ) -> Self {
        Self {
            observer,
            activity,
            resources,
            sessions,
            snapshot,
            paused,
            collection_frequency,
            time_provider,
        }
    }

    /// Changes the polling period. Idle accounting adds whole periods, so the manager follows.
    /// Callers only pass whole seconds.
    pub fn set_frequency(&mut self, frequency: Duration) {
        self.collection_frequency = frequency;
        self.sessions.set_poll_interval(frequency.as_secs());
    }

    fn observe_window(&self) -> Option<ActiveWindowData> {
        self.observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_active_window()
            .inspect_err(|e| debug!("Failed to read active window {e:?}"))
            .ok()
            .flatten()
    }

    /// Runs a single tick.
    pub fn collect(&mut self) -> TickReport {
        let now = self.time_provider.time();
        let window = self.observe_window();
        let activity = self.activity.sample();
        let resources = match (&window, self.resources.as_mut()) {
            (Some(window), Some(sampler)) => sampler.usage_for(&window.app_name),
            _ => ResourceUsage::default(),
        };

        let report = self.sessions.tick(now, window.as_ref(), &activity, resources);
        self.publish();
        report
    }

    /// Closes the open session, if any.
    pub fn finish(&mut self) -> Option<CloseOutcome> {
        let outcome = self.sessions.stop(self.time_provider.time());
        self.publish();
        outcome
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.sessions.snapshot());
    }

    /// Executes the collector event loop until `shutdown` is cancelled. A tick that already
    /// started always completes. The module is handed back so tracking can be restarted.
    pub async fn run(mut self, shutdown: CancellationToken) -> Self {
        let mut collection_point = self.time_provider.instant();
        loop {
            collection_point += self.collection_frequency;

            if self.paused.load(Ordering::Relaxed) {
                trace!("Tracking is paused, skipping tick");
            } else {
                let report = debug_span!("tick").in_scope(|| self.collect());
                if let Some((reason, outcome)) = report.closed {
                    debug!("Session closed {reason:?}: {outcome:?}");
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = self.time_provider.sleep_until(collection_point) => ()
            }
        }

        if let Some(outcome) = self.finish() {
            info!("Closed open session on stop: {outcome:?}");
        }
        self
    }
}
