use std::time::Duration;

use tracing::debug;

use crate::window_api::InputProbe;

use super::afk::AfkEvaluator;

/// Idle time below this is taken as a sign of recent keyboard use. The platform probes can't tell
/// keys and pointer apart, so pointer input counts as well.
const KEYBOARD_ACTIVITY_WINDOW: Duration = Duration::from_secs(1);

const MOUSE_MOVEMENT_CAP: u32 = 100;
const KEYBOARD_EVENT_CAP: u32 = 50;

/// Input signals gathered during one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActivitySample {
    pub idle_time: Duration,
    pub is_idle: bool,
    pub keyboard_active: bool,
    pub intensity: f64,
}

/// Saturating counters behind the activity intensity score. Not a sliding window: both counters
/// are reset together once either exceeds its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntensityCounters {
    pub mouse_movements: u32,
    pub keyboard_events: u32,
}

impl IntensityCounters {
    /// Registers one tick of input and returns the intensity in `[0, 1]`.
    pub fn register(&mut self, pointer_moved: bool, keyboard_active: bool) -> f64 {
        if pointer_moved {
            self.mouse_movements += 1;
        }
        if keyboard_active {
            self.keyboard_events += 1;
        }

        let intensity =
            ((self.mouse_movements + 2 * self.keyboard_events) as f64 / 10.0).min(1.0);

        if self.mouse_movements > MOUSE_MOVEMENT_CAP || self.keyboard_events > KEYBOARD_EVENT_CAP {
            *self = Self::default();
        }
        intensity
    }
}

/// Wraps the platform [InputProbe] and turns its raw readings into an [ActivitySample].
pub struct ActivityMonitor {
    probe: Box<dyn InputProbe>,
    afk_evaluator: AfkEvaluator,
    last_pointer: Option<(i32, i32)>,
    counters: IntensityCounters,
}

impl ActivityMonitor {
    pub fn new(probe: Box<dyn InputProbe>, afk_evaluator: AfkEvaluator) -> Self {
        Self {
            probe,
            afk_evaluator,
            last_pointer: None,
            counters: IntensityCounters::default(),
        }
    }

    pub fn counters(&self) -> IntensityCounters {
        self.counters
    }

    /// Failed readings degrade to "no input information" for this tick.
    pub fn sample(&mut self) -> ActivitySample {
        let idle_time = self
            .probe
            .idle_time()
            .inspect_err(|e| debug!("Failed to read idle time {e:?}"))
            .unwrap_or(Duration::ZERO);

        let pointer = self
            .probe
            .pointer_position()
            .inspect_err(|e| debug!("Failed to read pointer position {e:?}"))
            .ok()
            .flatten();
        let pointer_moved = match (self.last_pointer, pointer) {
            (Some(previous), Some(current)) => previous != current,
            _ => false,
        };
        if pointer.is_some() {
            self.last_pointer = pointer;
        }

        let keyboard_active = idle_time < KEYBOARD_ACTIVITY_WINDOW;
        let intensity = self.counters.register(pointer_moved, keyboard_active);

        ActivitySample {
            idle_time,
            is_idle: self.afk_evaluator.is_afk(idle_time),
            keyboard_active,
            intensity,
        }
    }
}
