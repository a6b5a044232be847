//! Contains logic for observing the focused window and user input on different environments.
//! [PlatformWindowManager] is the main artifact of this module: it is selected once at startup and
//! degrades to [PlatformWindowManager::Unavailable] when the native facility can't be reached.

#[cfg(feature = "mac")]
pub mod mac;
#[cfg(target_os = "linux")]
pub mod proc_idle;
#[cfg(feature = "win")]
pub mod win;
#[cfg(feature = "x11")]
pub mod x11;

#[cfg(feature = "win")]
extern crate windows;

#[cfg(feature = "x11")]
extern crate xcb;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveWindowData {
    /// Short name of the owning application. For example 'firefox' or 'Code.exe'
    pub app_name: Arc<str>,
    /// Name of the window. For example 'bash in hello' or 'Vibing in YouTube - Chrome'. Might be
    /// empty.
    pub window_title: Arc<str>,
}

impl ActiveWindowData {
    pub fn new(app_name: impl Into<Arc<str>>, window_title: impl Into<Arc<str>>) -> Self {
        Self {
            app_name: app_name.into(),
            window_title: window_title.into(),
        }
    }
}

/// Contract for finding out which window currently holds focus.
///
/// `Ok(None)` means nothing is focused (or the facility is unavailable). An `Err` is a transient
/// failure for this probe only, e.g. the process exited between focus change and name lookup.
#[cfg_attr(test, mockall::automock)]
pub trait WindowObserver: Send {
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>>;
}

/// Contract for the raw input signals the activity monitor is built from.
#[cfg_attr(test, mockall::automock)]
pub trait InputProbe: Send {
    /// Time since the last keyboard or pointer event.
    fn idle_time(&mut self) -> Result<Duration>;

    /// Pointer position in screen coordinates, `None` if the platform can't report it.
    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>>;
}

/// Observer used when no native facility is present. Permanently reports "no data".
#[derive(Clone, Default)]
pub struct Unavailable {
    #[cfg(target_os = "linux")]
    idle_estimate: Option<proc_idle::InterruptIdleEstimator>,
}

/// The closed set of window managers. Chosen once via [PlatformWindowManager::detect].
#[derive(Clone)]
pub enum PlatformWindowManager {
    #[cfg(feature = "win")]
    Windows(win::WindowsWindowManager),
    #[cfg(feature = "mac")]
    Mac(mac::MacWindowManager),
    #[cfg(feature = "x11")]
    Linux(x11::LinuxWindowManager),
    Unavailable(Unavailable),
}

impl PlatformWindowManager {
    /// Picks the variant for the host. Failing to reach the native facility is not fatal, it's
    /// logged here once and the returned manager reports no data from then on.
    pub fn detect() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(feature = "win")] {
                Self::Windows(win::WindowsWindowManager::new())
            }
            else if #[cfg(feature = "mac")] {
                match mac::MacWindowManager::new() {
                    Ok(manager) => Self::Mac(manager),
                    Err(e) => {
                        warn!("macOS window observation is unavailable: {e:?}");
                        Self::Unavailable(Unavailable::default())
                    }
                }
            }
            else if #[cfg(feature = "x11")] {
                match x11::LinuxWindowManager::new() {
                    Ok(manager) => Self::Linux(manager),
                    Err(e) => {
                        warn!("X11 window observation is unavailable: {e:?}");
                        Self::Unavailable(Unavailable::linux_fallback())
                    }
                }
            }
            else {
                warn!("No window manager was compiled in, window observation is unavailable");
                Self::Unavailable(Unavailable::new())
            }
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }
}

impl Unavailable {
    #[allow(dead_code)]
    fn new() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(target_os = "linux")] {
                Self::linux_fallback()
            } else {
                Self::default()
            }
        }
    }

    #[cfg(target_os = "linux")]
    fn linux_fallback() -> Self {
        let idle_estimate = proc_idle::InterruptIdleEstimator::new()
            .inspect_err(|e| warn!("Coarse idle estimation is unavailable: {e:?}"))
            .ok();
        Self { idle_estimate }
    }
}

impl WindowObserver for Unavailable {
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        Ok(None)
    }
}

impl InputProbe for Unavailable {
    fn idle_time(&mut self) -> Result<Duration> {
        #[cfg(target_os = "linux")]
        if let Some(estimate) = self.idle_estimate.as_mut() {
            return estimate.idle_time();
        }
        Ok(Duration::ZERO)
    }

    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>> {
        Ok(None)
    }
}

impl WindowObserver for PlatformWindowManager {
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        match self {
            #[cfg(feature = "win")]
            Self::Windows(inner) => inner.get_active_window(),
            #[cfg(feature = "mac")]
            Self::Mac(inner) => inner.get_active_window(),
            #[cfg(feature = "x11")]
            Self::Linux(inner) => inner.get_active_window(),
            Self::Unavailable(inner) => inner.get_active_window(),
        }
    }
}

impl InputProbe for PlatformWindowManager {
    fn idle_time(&mut self) -> Result<Duration> {
        match self {
            #[cfg(feature = "win")]
            Self::Windows(inner) => inner.idle_time(),
            #[cfg(feature = "mac")]
            Self::Mac(inner) => inner.idle_time(),
            #[cfg(feature = "x11")]
            Self::Linux(inner) => inner.idle_time(),
            Self::Unavailable(inner) => inner.idle_time(),
        }
    }

    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>> {
        match self {
            #[cfg(feature = "win")]
            Self::Windows(inner) => inner.pointer_position(),
            #[cfg(feature = "mac")]
            Self::Mac(inner) => inner.pointer_position(),
            #[cfg(feature = "x11")]
            Self::Linux(inner) => inner.pointer_position(),
            Self::Unavailable(inner) => inner.pointer_position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_reports_no_window() -> Result<()> {
        let mut manager = PlatformWindowManager::Unavailable(Unavailable::default());
        assert!(!manager.is_available());
        assert_eq!(manager.get_active_window()?, None);
        assert_eq!(manager.pointer_position()?, None);
        assert_eq!(manager.idle_time()?, Duration::ZERO);
        Ok(())
    }
}
