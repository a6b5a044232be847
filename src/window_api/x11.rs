use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};
use xcb::{
    screensaver::{QueryInfo, QueryInfoReply},
    x::{
        self, Atom, Drawable, GetInputFocus, GetProperty, GrabServer, InternAtom, QueryPointer,
        UngrabServer, Window, ATOM_ANY, ATOM_STRING, ATOM_WM_CLASS, ATOM_WM_NAME,
    },
    Connection, Extension, Xid,
};

use super::{proc_idle::InterruptIdleEstimator, ActiveWindowData, InputProbe, WindowObserver};

const UNKNOWN_APP: &str = "Unknown App";
const UNKNOWN_WINDOW: &str = "Unknown Window";

fn intern_atom(conn: &Connection, name: &[u8]) -> Result<Atom> {
    let reply = conn.wait_for_reply(conn.send_request(&InternAtom {
        only_if_exists: false,
        name,
    }))?;
    Ok(reply.atom())
}

fn get_pid(conn: &Connection, window: Window, pid_atom: Atom) -> Result<Option<u32>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: pid_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    Ok(result.value::<u32>().first().copied())
}

fn get_process_name(id: u32) -> Option<String> {
    let pid = Pid::from_u32(id);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .map(|process| process.name().to_string_lossy().into_owned())
}

/// `WM_CLASS` holds `instance\0class\0`. The class is the stable, human friendly part.
fn get_wm_class(conn: &Connection, window: Window) -> Result<Option<String>> {
    let reply = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window,
        property: ATOM_WM_CLASS,
        r#type: ATOM_STRING,
        long_offset: 0,
        long_length: 256,
    }))?;
    Ok(parse_wm_class(reply.value::<u8>()))
}

fn parse_wm_class(raw: &[u8]) -> Option<String> {
    let parts = raw
        .split(|v| *v == 0)
        .filter(|v| !v.is_empty())
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect::<Vec<_>>();
    parts.get(1).or_else(|| parts.first()).cloned()
}

fn get_active_window(
    conn: &Connection,
    root: Window,
    active_window_atom: Atom,
) -> Result<Option<Window>> {
    let result = conn.wait_for_reply(conn.send_request(&GetProperty {
        delete: false,
        window: root,
        property: active_window_atom,
        r#type: ATOM_ANY,
        long_offset: 0,
        long_length: 1,
    }))?;
    if let Some(window) = result.value::<Window>().first().filter(|v| !v.is_none()) {
        return Ok(Some(*window));
    }

    // Window managers without EWMH support only expose input focus.
    let focus = conn.wait_for_reply(conn.send_request(&GetInputFocus {}))?;
    let window = focus.focus();
    if window.is_none() || window == root {
        Ok(None)
    } else {
        Ok(Some(window))
    }
}

fn get_name(conn: &Connection, window: Window, property: Atom) -> Result<Option<String>> {
    let wm_name = conn.wait_for_reply(conn.send_request(&x::GetProperty {
        delete: false,
        window,
        property,
        r#type: x::ATOM_ANY,
        long_offset: 0,
        long_length: 1024,
    }))?;
    let value = wm_name.value::<u8>();
    if value.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(value).into_owned()))
}

struct Atoms {
    active_window: Atom,
    net_wm_name: Atom,
    pid: Atom,
}

#[derive(Clone)]
pub struct LinuxWindowManager {
    connection: Arc<Connection>,
    root: Window,
    atoms: Arc<Atoms>,
    has_screensaver: bool,
    idle_fallback: Option<InterruptIdleEstimator>,
}

impl LinuxWindowManager {
    pub fn new() -> Result<Self> {
        let (connection, preferred_screen) =
            Connection::connect_with_extensions(None, &[], &[Extension::ScreenSaver])?;
        let root = connection
            .get_setup()
            .roots()
            .nth(preferred_screen.max(0) as usize)
            .context("X11 server reported no screens")?
            .root();
        let atoms = Atoms {
            active_window: intern_atom(&connection, b"_NET_ACTIVE_WINDOW")?,
            net_wm_name: intern_atom(&connection, b"_NET_WM_NAME")?,
            pid: intern_atom(&connection, b"_NET_WM_PID")?,
        };
        let has_screensaver = connection
            .active_extensions()
            .any(|v| v == Extension::ScreenSaver);
        let idle_fallback = if has_screensaver {
            None
        } else {
            debug!("Screensaver extension is missing, idle time falls back to /proc/interrupts");
            InterruptIdleEstimator::new().ok()
        };
        Ok(Self {
            connection: Arc::new(connection),
            root,
            atoms: Arc::new(atoms),
            has_screensaver,
            idle_fallback,
        })
    }

    fn app_name(&self, window: Window) -> Result<String> {
        if let Some(class) = get_wm_class(&self.connection, window)? {
            return Ok(class);
        }
        let name = get_pid(&self.connection, window, self.atoms.pid)?.and_then(get_process_name);
        Ok(name.unwrap_or_else(|| UNKNOWN_APP.to_string()))
    }

    fn window_title(&self, window: Window) -> Result<String> {
        for property in [self.atoms.net_wm_name, ATOM_WM_NAME] {
            if let Some(title) = get_name(&self.connection, window, property)? {
                return Ok(title);
            }
        }
        Ok(UNKNOWN_WINDOW.to_string())
    }

    #[instrument(skip(self))]
    fn get_active_inner(&self) -> Result<Option<ActiveWindowData>> {
        let Some(active_window) =
            get_active_window(&self.connection, self.root, self.atoms.active_window)?
        else {
            return Ok(None);
        };
        let window_title = self.window_title(active_window)?;
        let app_name = self.app_name(active_window)?;
        Ok(Some(ActiveWindowData::new(app_name, window_title)))
    }
}

impl WindowObserver for LinuxWindowManager {
    #[instrument(skip(self))]
    fn get_active_window(&mut self) -> Result<Option<ActiveWindowData>> {
        let _ = self.connection.send_request(&GrabServer {});
        let result = self.get_active_inner();
        let _ = self.connection.send_request(&UngrabServer {});
        result
    }
}

impl InputProbe for LinuxWindowManager {
    #[instrument(skip(self))]
    fn idle_time(&mut self) -> Result<Duration> {
        if !self.has_screensaver {
            return match self.idle_fallback.as_mut() {
                Some(estimate) => estimate.idle_time(),
                None => Ok(Duration::ZERO),
            };
        }
        let idle = self.connection.send_request(&QueryInfo {
            drawable: Drawable::Window(self.root),
        });
        let reply: QueryInfoReply = self.connection.wait_for_reply(idle)?;
        Ok(Duration::from_millis(reply.ms_since_user_input() as u64))
    }

    fn pointer_position(&mut self) -> Result<Option<(i32, i32)>> {
        let reply = self
            .connection
            .wait_for_reply(self.connection.send_request(&QueryPointer { window: self.root }))?;
        Ok(Some((reply.root_x() as i32, reply.root_y() as i32)))
    }
}
