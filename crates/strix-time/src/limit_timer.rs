//! Countdown/up timer with a configurable limit, divider, and work mode.

use crate::error::TimerError;
use crate::sched::{
    ClockScheduler, Direction, TimerEvent, TimerHandle, TimerParams, WorkMode,
};

/// Construction parameters for a [`LimitTimer`].
#[derive(Debug, Clone, Copy)]
pub struct LimitTimerConfig {
    pub frequency_hz: u64,
    pub divider: u32,
    pub limit: u64,
    pub direction: Direction,
    pub mode: WorkMode,
    pub enabled: bool,
    pub event_enabled: bool,
}

impl LimitTimerConfig {
    /// Periodic ascending timer, disabled, with events on: the common
    /// general-purpose-timer starting point.
    pub fn new(frequency_hz: u64, limit: u64) -> Self {
        Self {
            frequency_hz,
            divider: 1,
            limit,
            direction: Direction::Ascending,
            mode: WorkMode::Periodic,
            enabled: false,
            event_enabled: true,
        }
    }
}

fn reset_point(direction: Direction, limit: u64) -> u64 {
    match direction {
        Direction::Ascending => 0,
        Direction::Descending => limit,
    }
}

/// Countdown/up timer primitive.
///
/// The value is computed lazily from elapsed virtual time; enabling arms one
/// scheduler wake-up at the next crossing and disabling cancels it while
/// preserving the accumulated value. Crossings arrive as events drained via
/// [`LimitTimer::take_events`].
#[derive(Debug)]
pub struct LimitTimer {
    sched: ClockScheduler,
    handle: TimerHandle,
    initial_enabled: bool,
}

impl LimitTimer {
    pub fn new(sched: &ClockScheduler, config: LimitTimerConfig) -> Result<Self, TimerError> {
        let handle = sched.register_limit(TimerParams {
            frequency_hz: config.frequency_hz,
            divider: config.divider,
            direction: config.direction,
            mode: config.mode,
            limit: config.limit,
            value: reset_point(config.direction, config.limit),
            enabled: config.enabled,
            event_enabled: config.event_enabled,
        })?;
        Ok(Self {
            sched: sched.clone(),
            handle,
            initial_enabled: config.enabled,
        })
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    /// Current reading, projected from elapsed virtual time.
    pub fn value(&self) -> u64 {
        self.sched.value(self.handle)
    }

    pub fn set_value(&self, value: u64) {
        self.sched.set_value(self.handle, value);
    }

    pub fn limit(&self) -> u64 {
        self.sched.params(self.handle).limit
    }

    /// Changes the limit. `rearm` selects between the two register semantics
    /// found in real hardware: `false` keeps the accumulated value (a value
    /// already at or past the new limit crosses on the next advance), `true`
    /// also reloads the value to the mode-appropriate reset point.
    pub fn set_limit(&self, limit: u64, rearm: bool) -> Result<(), TimerError> {
        self.sched.exchange(self.handle, |params| {
            params.limit = limit;
            if rearm {
                params.value = reset_point(params.direction, limit);
            }
        })
    }

    pub fn set_limit_keep_value(&self, limit: u64) -> Result<(), TimerError> {
        self.set_limit(limit, false)
    }

    pub fn set_limit_and_reload(&self, limit: u64) -> Result<(), TimerError> {
        self.set_limit(limit, true)
    }

    pub fn divider(&self) -> u32 {
        self.sched.params(self.handle).divider
    }

    /// Prescales the input clock. Accumulated value is preserved; only the
    /// effective rate of future ticks changes.
    pub fn set_divider(&self, divider: u32) -> Result<(), TimerError> {
        self.sched
            .exchange(self.handle, |params| params.divider = divider)
    }

    pub fn frequency(&self) -> u64 {
        self.sched.params(self.handle).frequency_hz
    }

    /// Rescales ticks-per-second for future scheduling only; already
    /// accumulated value is never rewritten.
    pub fn set_frequency(&self, frequency_hz: u64) -> Result<(), TimerError> {
        self.sched
            .exchange(self.handle, |params| params.frequency_hz = frequency_hz)
    }

    pub fn mode(&self) -> WorkMode {
        self.sched.params(self.handle).mode
    }

    pub fn set_mode(&self, mode: WorkMode) {
        self.sched
            .exchange(self.handle, |params| params.mode = mode)
            .expect("mode change cannot invalidate the configuration");
    }

    pub fn direction(&self) -> Direction {
        self.sched.params(self.handle).direction
    }

    pub fn is_enabled(&self) -> bool {
        self.sched.is_enabled(self.handle)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.sched.set_enabled(self.handle, enabled);
    }

    pub fn event_enabled(&self) -> bool {
        self.sched.params(self.handle).event_enabled
    }

    pub fn set_event_enabled(&self, event_enabled: bool) -> Result<(), TimerError> {
        self.sched
            .exchange(self.handle, |params| params.event_enabled = event_enabled)
    }

    /// Drains crossings delivered since the last drain.
    pub fn take_events(&self) -> Vec<TimerEvent> {
        self.sched.take_events(self.handle)
    }

    /// Discards undelivered crossings (owners whose protocol lets a refresh
    /// suppress a same-instant crossing).
    pub fn clear_pending(&self) {
        self.sched.clear_events(self.handle)
    }

    /// Restores the value to the reset point and the enabled flag to its
    /// construction default; limit, divider, and mode are left untouched.
    pub fn reset(&self) {
        let initial_enabled = self.initial_enabled;
        self.sched
            .exchange(self.handle, |params| {
                params.value = reset_point(params.direction, params.limit);
                params.enabled = initial_enabled;
            })
            .expect("reset cannot invalidate the configuration");
        self.sched.clear_events(self.handle);
    }
}

impl Drop for LimitTimer {
    fn drop(&mut self) {
        self.sched.unregister(self.handle);
    }
}
