//! Reference register-mapped peripheral adapters for the timer engine.
//!
//! These models decode double-word register accesses into operations on the
//! engine primitives; bus width translation stays with the bus layer. Every
//! access first drains pending timer events, so a crossing's side effects are
//! always observable before the value it produced.

#![forbid(unsafe_code)]

pub mod gptimer;
pub mod mtimer;
pub mod wdt;

pub use gptimer::{GpTimer, GpTimerConfig};
pub use mtimer::Mtimer;
pub use wdt::{Wdt, WdtConfig};
