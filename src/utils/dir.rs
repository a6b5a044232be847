use std::{env, path::PathBuf};

use anyhow::{Context, Result};

const APP_DIR_NAME: &str = "focuswatch";

/// Per-user directory holding the database, configuration and logs. Created if missing.
pub fn create_application_default_path() -> Result<PathBuf> {
    let mut path = platform_state_dir()?;
    path.push(APP_DIR_NAME);
    std::fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create application directory {path:?}"))?;
    Ok(path)
}

#[cfg(windows)]
fn platform_state_dir() -> Result<PathBuf> {
    env::var("APPDATA")
        .map(PathBuf::from)
        .context("APPDATA should be present on Windows")
}

#[cfg(target_os = "macos")]
fn platform_state_dir() -> Result<PathBuf> {
    let home = env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join("Library/Application Support"))
}

#[cfg(not(any(windows, target_os = "macos")))]
fn platform_state_dir() -> Result<PathBuf> {
    env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|home| PathBuf::from(home).join(".local/state")))
        .context("Couldn't find neither XDG_STATE_HOME nor HOME")
}
