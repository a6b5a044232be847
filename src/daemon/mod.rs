use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::{
    config::TrackerConfig,
    utils::clock::DefaultClock,
    window_api::PlatformWindowManager,
};

use storage::sqlite::{SqliteSessionStore, DATABASE_FILE_NAME};
use tracker::ActivityTracker;

pub mod collection;
pub mod session;
pub mod shutdown;
pub mod storage;
pub mod tracker;

/// Represents the starting point for the daemon. Tracks until the process is asked to stop.
pub async fn start_daemon(dir: &Path, config: TrackerConfig) -> Result<()> {
    let store = open_store(dir, &config, Utc::now())?;

    let platform = PlatformWindowManager::detect();
    if !platform.is_available() {
        error!("No window information is available on this system, sessions won't be recorded");
    }

    let mut tracker = ActivityTracker::new(
        &config,
        Box::new(platform.clone()),
        Box::new(platform),
        Box::new(store),
        Arc::new(DefaultClock),
    )?;

    tracker.start_tracking(config.interval())?;
    shutdown::wait_for_shutdown().await;
    info!("Shutdown requested");
    tracker.stop_tracking().await;

    Ok(())
}

/// Opens the session store and brings it into a consistent state before tracking: sessions left
/// unfinished by a previous run are dropped and data past retention is removed.
fn open_store(
    dir: &Path,
    config: &TrackerConfig,
    now: DateTime<Utc>,
) -> Result<SqliteSessionStore> {
    let mut store = SqliteSessionStore::open(&dir.join(DATABASE_FILE_NAME))?;

    let orphans = store.discard_open_sessions()?;
    if orphans > 0 {
        warn!("Dropped {orphans} sessions left unfinished by a previous run");
    }

    match store.cleanup_old_data(config.retention_days, now) {
        Ok(0) => (),
        Ok(removed) => info!("Removed {removed} rows older than {} days", config.retention_days),
        Err(e) => error!("Failed to remove old data {e:?}"),
    }
    Ok(store)
}
