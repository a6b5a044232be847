use std::{path::Path, time::Duration};

use anyhow::{anyhow, Result};
use tracing::{debug, instrument};
use windows::{
    core::PWSTR,
    Win32::{
        Foundation::{CloseHandle, BOOL, HANDLE, HWND, POINT},
        System::{
            SystemInformation::GetTickCount64,
            Threading::{
                OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32,
                PROCESS_QUERY_LIMITED_INFORMATION,
            },
        },
        UI::{
            Input::KeyboardAndMouse::{GetLastInputInfo, LASTINPUTINFO},
            WindowsAndMessaging::{
                GetCursorPos, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
            },
        },
    },
};

use super::{ActiveWindowData, InputProbe, WindowObserver};

const UNKNOWN_APP: &str = "Unknown";

#[instrument]
pub fn get_active() -> Result<Option<ActiveWindowData>> {
    let window = unsafe { GetForegroundWindow() };

    if window.is_invalid() {
        return Ok(None);
    }

    let mut text: [u16; 4096] = [0; 4096];
    let title = unsafe { get_window_title(window, &mut text) };
    if title.is_empty() {
        return Ok(None);
    }

    let mut id = 0u32;
    unsafe { GetWindowThreadProcessId(window, Some(&mut id)) };
    if id == 0 {
        return Err(anyhow!(
            "Failed to get owner of the foreground window: {}",
            windows::core::Error::from_win32()
        ));
    }

    let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, BOOL::from(false), id) };
    let app_name = match process {
        Ok(process_handle) => {
            let path = unsafe { get_window_process_path(process_handle, &mut text) };
            unsafe { CloseHandle(process_handle) }
                .inspect_err(|e| debug!("Failed to close handle {e:?}"))?;
            path.map(|path| executable_name(&path))?
        }
        // Elevated processes refuse the query, they still have a title worth tracking.
        Err(e) => {
            debug!("Failed to open process {id}: {e:?}");
            UNKNOWN_APP.to_string()
        }
    };

    Ok(Some(ActiveWindowData::new(app_name, title)))
}

fn executable_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|v| v.to_str())
        .unwrap_or(UNKNOWN_APP)
        .to_string()
}

unsafe fn get_window_process_path(process_handle: HANDLE, text: &mut [u16]) -> Result<String> {
    unsafe {
        let mut length = text.len() as u32;
        QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            PWSTR(text.as_mut_ptr()),
            &mut length,
        )?;
        Ok(String::from_utf16_lossy(&text[..length as usize]))
    }
}

unsafe fn get_window_title(window_handle: HWND, text: &mut [u16]) -> String {
    let len = unsafe { GetWindowTextW(window_handle, text) };
    String::from_utf16_lossy(&text[..len.max(0) as usize])
}

pub fn get_idle_time() -> Result<Duration> {
    let mut last: LASTINPUTINFO = LASTINPUTINFO {
        cbSize: size_of::<LASTINPUTINFO>() as u32,
        dwTime: 0,
    };
    let is_success = unsafe { GetLastInputInfo(&mut last) };
    if !is_success.as_bool() {
        return Err(anyhow!("Failed to retrieve user idle time"));
    }

    // dwTime is a 32 bit tick count, so only the low half of the 64 bit counter is comparable.
    let tick_count = unsafe { GetTickCount64() } as u32;
    let millis = tick_count.wrapping_sub(last.dwTime);
    Ok(Duration::from_millis(millis as u64))
}

pub fn get_cursor_position() -> Result<(i32, i32)> {
    let mut point = POINT::default();
    unsafe { GetCursorPos(&mut point) }?;
    Ok((point.x, point.y))
}

#[derive(Clone, Default)]
pub struct WindowsWindowManager {}

impl WindowsWindowManager {
    pub fn new() -> Self {
        Self {}
    }
}

impl WindowObserver for WindowsWindowManager {
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        get_active()
    }
}

impl InputProbe for WindowsWindowManager {
    fn idle_time(&mut self) -> Result<Duration> {
        get_idle_time()
    }

    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>> {
        get_cursor_position().map(Some)
    }
}
