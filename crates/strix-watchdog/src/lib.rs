//! Generalized watchdog timeout state machine.
//!
//! Register-level watchdog peripherals differ wildly in layout but share one
//! protocol: a countdown that must be refreshed with the right key, inside
//! the right window, before it expires, and a layered response (warning
//! interrupt, then reset) when it is not. [`WatchdogSession`] captures that
//! protocol once; adapters decode registers into its operations.

#![forbid(unsafe_code)]

mod session;

pub use session::{
    FeedOutcome, FeedWindow, ForbiddenFeedPolicy, WatchdogCallbacks, WatchdogConfig,
    WatchdogPhase, WatchdogSession,
};
