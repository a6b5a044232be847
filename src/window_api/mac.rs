//! macOS variant. Frontmost application and its front window are read through System Events,
//! idle time through the `HIDIdleTime` counter of the IOHIDSystem registry entry.

use std::{process::Command, time::Duration};

use anyhow::{anyhow, bail, Context, Result};
use tracing::instrument;

use super::{ActiveWindowData, InputProbe, WindowObserver};

const FRONTMOST_SCRIPT: &str = r#"
tell application "System Events"
    set frontApp to first application process whose frontmost is true
    set appName to name of frontApp
    set windowTitle to ""
    try
        set windowTitle to name of front window of frontApp
    end try
end tell
return appName & linefeed & windowTitle
"#;

const UNKNOWN_WINDOW: &str = "Unknown Window";

fn run(command: &mut Command) -> Result<String> {
    let output = command.output().context("Failed to spawn helper process")?;
    if !output.status.success() {
        bail!(
            "Helper process exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn parse_frontmost(output: &str) -> Option<ActiveWindowData> {
    let mut lines = output.lines();
    let app_name = lines.next().map(str::trim).filter(|v| !v.is_empty())?;
    let window_title = lines
        .next()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_WINDOW);
    Some(ActiveWindowData::new(app_name, window_title))
}

/// Extracts `"HIDIdleTime" = <nanoseconds>` from `ioreg -c IOHIDSystem` output.
fn parse_hid_idle(output: &str) -> Option<Duration> {
    output
        .lines()
        .find(|line| line.contains("\"HIDIdleTime\""))
        .and_then(|line| line.split('=').nth(1))
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_nanos)
}

#[derive(Clone)]
pub struct MacWindowManager {}

impl MacWindowManager {
    /// Fails when System Events can't be scripted, e.g. automation permission was refused.
    pub fn new() -> Result<Self> {
        run(Command::new("osascript").args(["-e", "return 1"]))
            .context("osascript is not usable")?;
        Ok(Self {})
    }
}

impl WindowObserver for MacWindowManager {
    #[instrument(skip(self))]
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        let output = run(Command::new("osascript").args(["-e", FRONTMOST_SCRIPT]))?;
        Ok(parse_frontmost(&output))
    }
}

impl InputProbe for MacWindowManager {
    #[instrument(skip(self))]
    fn idle_time(&mut self) -> Result<Duration> {
        let output = run(Command::new("ioreg").args(["-c", "IOHIDSystem", "-d", "4"]))?;
        parse_hid_idle(&output).ok_or_else(|| anyhow!("HIDIdleTime is missing from ioreg output"))
    }

    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frontmost_output_is_split_into_app_and_title() {
        assert_eq!(
            parse_frontmost("Safari\nRust Programming Language\n"),
            Some(ActiveWindowData::new("Safari", "Rust Programming Language"))
        );
        assert_eq!(
            parse_frontmost("Finder\n\n"),
            Some(ActiveWindowData::new("Finder", UNKNOWN_WINDOW))
        );
        assert_eq!(parse_frontmost("\n"), None);
    }

    #[test]
    fn hid_idle_is_read_in_nanoseconds() {
        let output = "    | |   \"HIDIdleTime\" = 2500000000\n";
        assert_eq!(parse_hid_idle(output), Some(Duration::from_millis(2500)));
    }
}
