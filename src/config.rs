//! Tracker settings. Stored as `config.json` in the application directory; keys missing from the
//! file fall back to their defaults so older files keep working.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between two polls of the focused window.
    pub tracking_interval: u64,
    /// Seconds without input after which the user counts as idle.
    pub idle_threshold: u64,
    /// Sessions shorter than this are dropped instead of stored.
    pub min_session_duration: u64,
    /// Sessions at least this long are promoted to focus sessions.
    pub focus_threshold: u64,
    /// Accumulated idle seconds that force the open session to close.
    pub idle_session_threshold: u64,
    pub tracking_enabled: bool,
    pub focus_history_limit: usize,
    pub retention_days: u32,
    pub sample_resources: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_interval: 5,
            idle_threshold: 60,
            min_session_duration: 30,
            focus_threshold: 300,
            idle_session_threshold: 180,
            tracking_enabled: true,
            focus_history_limit: 256,
            retention_days: 90,
            sample_resources: true,
        }
    }
}

impl TrackerConfig {
    pub fn path_in(app_dir: &Path) -> PathBuf {
        app_dir.join(CONFIG_FILE_NAME)
    }

    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<TrackerConfig>(&content)?,
            Err(e) if e.kind() == ErrorKind::NotFound => TrackerConfig::default(),
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking_interval == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.idle_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("idle_threshold"));
        }
        if self.focus_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("focus_threshold"));
        }
        if self.idle_session_threshold == 0 {
            return Err(ConfigError::ZeroThreshold("idle_session_threshold"));
        }
        if self.min_session_duration >= self.focus_threshold {
            return Err(ConfigError::MinimumAboveFocus {
                min: self.min_session_duration,
                focus: self.focus_threshold,
            });
        }
        if self.focus_history_limit == 0 {
            return Err(ConfigError::EmptyFocusHistory);
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.tracking_interval)
    }
}
