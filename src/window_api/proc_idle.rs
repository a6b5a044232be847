//! Coarse idle estimation for Linux sessions without the X11 screensaver extension.
//!
//! `/proc/interrupts` keeps per-device interrupt counters. Whenever the counters of input
//! devices move, the user did something. Resolution is limited to how often the estimator is
//! polled.

use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::{bail, Context, Result};

const INTERRUPTS_PATH: &str = "/proc/interrupts";

/// Devices that are driven by a person sitting in front of the machine.
const INPUT_MARKERS: [&str; 4] = ["i8042", "keyboard", "mouse", "hid"];

#[derive(Debug, Clone)]
pub struct InterruptIdleEstimator {
    path: PathBuf,
    last_total: u64,
    last_change: Instant,
}

impl InterruptIdleEstimator {
    pub fn new() -> Result<Self> {
        Self::with_path(INTERRUPTS_PATH)
    }

    pub fn with_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let last_total = read_input_interrupts(&path)?;
        Ok(Self {
            path,
            last_total,
            last_change: Instant::now(),
        })
    }

    pub fn idle_time(&mut self) -> Result<Duration> {
        let total = read_input_interrupts(&self.path)?;
        if total != self.last_total {
            self.last_total = total;
            self.last_change = Instant::now();
        }
        Ok(self.last_change.elapsed())
    }
}

fn read_input_interrupts(path: &Path) -> Result<u64> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    match sum_input_interrupts(&content) {
        Some(total) => Ok(total),
        None => bail!("No input device interrupts listed in {}", path.display()),
    }
}

/// Sums per-cpu counters of every interrupt line that belongs to an input device.
fn sum_input_interrupts(content: &str) -> Option<u64> {
    let mut found = false;
    let mut total = 0u64;
    for line in content.lines() {
        let lowered = line.to_lowercase();
        if !INPUT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            continue;
        }
        let Some((_, counters)) = line.split_once(':') else {
            continue;
        };
        found = true;
        total += counters
            .split_whitespace()
            .map_while(|v| v.parse::<u64>().ok())
            .sum::<u64>();
    }
    found.then_some(total)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use tempfile::NamedTempFile;

    use super::*;

    const SAMPLE: &str = "           CPU0       CPU1\n\
                          0:         36          0   IO-APIC    2-edge      timer\n\
                          1:        120         15   IO-APIC    1-edge      i8042\n\
                          12:       400          2   IO-APIC   12-edge      i8042\n\
                          16:      9000       8000   IO-APIC   16-fasteoi   ehci_hcd:usb1\n";

    #[test]
    fn sums_only_input_lines() {
        assert_eq!(sum_input_interrupts(SAMPLE), Some(537));
    }

    #[test]
    fn missing_input_lines_are_reported() {
        let content = "  0:  36  0  IO-APIC  2-edge  timer\n";
        assert_eq!(sum_input_interrupts(content), None);
    }

    #[test]
    fn counter_change_resets_idle() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(SAMPLE.as_bytes())?;
        let mut estimator = InterruptIdleEstimator::with_path(file.path())?;
        estimator.last_change = Instant::now() - Duration::from_secs(30);

        assert!(estimator.idle_time()? >= Duration::from_secs(30));

        fs::write(file.path(), SAMPLE.replace("400", "401"))?;
        assert!(estimator.idle_time()? < Duration::from_secs(30));
        Ok(())
    }
}
