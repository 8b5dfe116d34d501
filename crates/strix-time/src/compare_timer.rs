//! Free-running ascending counter with an externally supplied compare target.

use crate::error::TimerError;
use crate::sched::{
    ClockScheduler, Direction, TimerEvent, TimerHandle, TimerParams, WorkMode,
};

/// Construction parameters for a [`CompareTimer`].
#[derive(Debug, Clone, Copy)]
pub struct CompareTimerConfig {
    pub frequency_hz: u64,
    pub divider: u32,
    pub enabled: bool,
    pub compare: u64,
}

impl CompareTimerConfig {
    pub fn new(frequency_hz: u64) -> Self {
        Self {
            frequency_hz,
            divider: 1,
            enabled: true,
            compare: u64::MAX,
        }
    }
}

/// Ascending free-running counter that fires once when the value reaches the
/// compare target. The engine never auto-increments the target; the owner
/// writes the next compare to re-arm a future firing (`mtimecmp` semantics).
#[derive(Debug)]
pub struct CompareTimer {
    sched: ClockScheduler,
    handle: TimerHandle,
    compare: u64,
    initial_enabled: bool,
}

impl CompareTimer {
    pub fn new(sched: &ClockScheduler, config: CompareTimerConfig) -> Result<Self, TimerError> {
        let handle = sched.register_compare(
            TimerParams {
                frequency_hz: config.frequency_hz,
                divider: config.divider,
                direction: Direction::Ascending,
                mode: WorkMode::Periodic,
                limit: u64::MAX,
                value: 0,
                enabled: config.enabled,
                event_enabled: true,
            },
            config.compare,
        )?;
        Ok(Self {
            sched: sched.clone(),
            handle,
            compare: config.compare,
            initial_enabled: config.enabled,
        })
    }

    pub fn handle(&self) -> TimerHandle {
        self.handle
    }

    pub fn value(&self) -> u64 {
        self.sched.value(self.handle)
    }

    pub fn set_value(&self, value: u64) {
        self.sched.set_value(self.handle, value);
    }

    pub fn compare(&self) -> u64 {
        self.compare
    }

    /// Writes a new compare target and re-arms the next firing. A target at
    /// or below the current value fires on the next advance.
    pub fn set_compare(&mut self, compare: u64) {
        self.compare = compare;
        self.sched.set_compare(self.handle, compare);
    }

    pub fn is_enabled(&self) -> bool {
        self.sched.is_enabled(self.handle)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.sched.set_enabled(self.handle, enabled);
    }

    pub fn set_divider(&self, divider: u32) -> Result<(), TimerError> {
        self.sched
            .exchange(self.handle, |params| params.divider = divider)
    }

    pub fn set_frequency(&self, frequency_hz: u64) -> Result<(), TimerError> {
        self.sched
            .exchange(self.handle, |params| params.frequency_hz = frequency_hz)
    }

    pub fn take_events(&self) -> Vec<TimerEvent> {
        self.sched.take_events(self.handle)
    }

    /// Restores the counter to zero and the enabled flag to its construction
    /// default; the compare target is left untouched.
    pub fn reset(&self) {
        let initial_enabled = self.initial_enabled;
        self.sched
            .exchange(self.handle, |params| {
                params.value = 0;
                params.enabled = initial_enabled;
            })
            .expect("reset cannot invalidate the configuration");
        self.sched.set_compare(self.handle, self.compare);
        self.sched.clear_events(self.handle);
    }
}

impl Drop for CompareTimer {
    fn drop(&mut self) {
        self.sched.unregister(self.handle);
    }
}
