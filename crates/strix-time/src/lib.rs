//! Virtual-time timer scheduling primitives for emulated machines.
//!
//! The emulator uses **virtual time** (monotonic nanoseconds since machine
//! reset) as the single source of truth for all timer devices. A
//! [`ClockScheduler`] owns every registered timer entry and advances them in
//! coarse batches; the [`LimitTimer`] and [`CompareTimer`] facades compute
//! their current reading lazily from elapsed virtual time, so thousands of
//! simulated timers cost nothing between deadlines.
//!
//! Crossings are delivered as typed [`TimerEvent`]s through per-entry queues
//! drained by the owning device's update step, never as re-entrant callbacks.

#![forbid(unsafe_code)]

mod compare_timer;
mod error;
mod limit_timer;
mod sched;

pub use compare_timer::{CompareTimer, CompareTimerConfig};
pub use error::TimerError;
pub use limit_timer::{LimitTimer, LimitTimerConfig};
pub use sched::{
    ClockScheduler, Direction, TimerEvent, TimerEventKind, TimerHandle, TimerParams, WorkMode,
    NS_PER_SEC,
};
