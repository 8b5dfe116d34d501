//! Register-mapped windowed watchdog.
//!
//! Configuration registers sit behind a lock key; the countdown is refreshed
//! by writing the feed key to FEED, optionally only inside a programmed
//! window. On timeout the block raises a warning interrupt and, if the grace
//! period also runs out, requests a system reset through its callbacks.
//! Protected-write violations are logged and ignored, the way the hardware
//! refuses them.

use strix_platform::cpu::{sync_current_cpu, CpuRegistry};
use strix_time::{ClockScheduler, TimerError};
use strix_watchdog::{
    FeedWindow, ForbiddenFeedPolicy, WatchdogCallbacks, WatchdogConfig, WatchdogPhase,
    WatchdogSession,
};

pub const WDT_MMIO_SIZE: u64 = 0x30;

/// Written to LOCK to open the configuration registers; any other value
/// closes them again.
pub const WDT_UNLOCK_KEY: u32 = 0x5A5A_A5A5;
/// Written to FEED to refresh the countdown.
pub const WDT_FEED_KEY: u32 = 0xB480_A602;

const REG_LOCK: u64 = 0x00;
const REG_CTRL: u64 = 0x04;
const REG_TIMEOUT: u64 = 0x08;
const REG_GRACE: u64 = 0x0C;
const REG_WINDOW_LOW: u64 = 0x10;
const REG_WINDOW_HIGH: u64 = 0x14;
const REG_FEED: u64 = 0x18;
const REG_COUNT: u64 = 0x1C;
const REG_STATUS: u64 = 0x20;

const CTRL_ENABLE: u32 = 1 << 0;
const CTRL_WARN_ENABLE: u32 = 1 << 1;
const CTRL_RESET_ENABLE: u32 = 1 << 2;
const CTRL_WINDOW_ENABLE: u32 = 1 << 3;
/// Forbidden-window feeds force a reset instead of latching the fault flag.
const CTRL_FORCE_RESET_POLICY: u32 = 1 << 4;

const STATUS_WARNED: u32 = 1 << 0;
const STATUS_FAULT: u32 = 1 << 1;
const STATUS_RESET_PENDING: u32 = 1 << 2;

const DEFAULT_TIMEOUT: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, Copy)]
pub struct WdtConfig {
    pub frequency_hz: u64,
    /// The enable bit is write-once until machine reset.
    pub enable_once: bool,
    /// Timeout/window registers are refused while armed.
    pub lock_while_armed: bool,
}

impl Default for WdtConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 32_768,
            enable_once: true,
            lock_while_armed: true,
        }
    }
}

pub struct Wdt {
    session: WatchdogSession,
    registry: CpuRegistry,
    locked: bool,
    window_low: u32,
    window_high: u32,
}

impl Wdt {
    pub fn new(
        sched: &ClockScheduler,
        config: WdtConfig,
        callbacks: WatchdogCallbacks,
        registry: CpuRegistry,
    ) -> Result<Self, TimerError> {
        let session = WatchdogSession::new(
            sched,
            WatchdogConfig {
                frequency_hz: config.frequency_hz,
                divider: 1,
                timeout_ticks: u64::from(DEFAULT_TIMEOUT),
                grace_ticks: 0,
                feed_key: WDT_FEED_KEY,
                window: None,
                forbidden_policy: ForbiddenFeedPolicy::IgnoreWithFault,
                warning_enabled: false,
                reset_enabled: true,
                enable_once: config.enable_once,
                lock_while_armed: config.lock_while_armed,
            },
            callbacks,
        )?;
        Ok(Self {
            session,
            registry,
            locked: true,
            window_low: 0,
            window_high: u32::MAX,
        })
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.session.phase()
    }

    pub fn poll(&mut self) {
        self.session.poll();
    }

    fn programmed_window(&self) -> FeedWindow {
        FeedWindow {
            low: u64::from(self.window_low),
            high: u64::from(self.window_high),
        }
    }

    pub fn mmio_read(&mut self, offset: u64) -> u32 {
        sync_current_cpu(&self.registry);
        self.session.poll();

        match offset {
            REG_LOCK => u32::from(self.locked),
            REG_CTRL => {
                let mut ctrl = 0;
                if matches!(
                    self.session.phase(),
                    WatchdogPhase::Armed | WatchdogPhase::Warned
                ) {
                    ctrl |= CTRL_ENABLE;
                }
                if self.session.warning_enabled() {
                    ctrl |= CTRL_WARN_ENABLE;
                }
                if self.session.reset_enabled() {
                    ctrl |= CTRL_RESET_ENABLE;
                }
                if self.session.window().is_some() {
                    ctrl |= CTRL_WINDOW_ENABLE;
                }
                if self.session.forbidden_policy() == ForbiddenFeedPolicy::ForceReset {
                    ctrl |= CTRL_FORCE_RESET_POLICY;
                }
                ctrl
            }
            REG_TIMEOUT => self.session.timeout_ticks() as u32,
            REG_GRACE => self.session.grace_ticks() as u32,
            REG_WINDOW_LOW => self.window_low,
            REG_WINDOW_HIGH => self.window_high,
            REG_FEED => 0,
            REG_COUNT => self.session.countdown_remaining() as u32,
            REG_STATUS => {
                let mut status = 0;
                if self.session.phase() == WatchdogPhase::Warned {
                    status |= STATUS_WARNED;
                }
                if self.session.fault() {
                    status |= STATUS_FAULT;
                }
                if self.session.phase() == WatchdogPhase::ResetPending {
                    status |= STATUS_RESET_PENDING;
                }
                status
            }
            _ => 0,
        }
    }

    pub fn mmio_write(&mut self, offset: u64, value: u32) {
        sync_current_cpu(&self.registry);
        self.session.poll();

        match offset {
            REG_LOCK => {
                self.locked = value != WDT_UNLOCK_KEY;
            }
            REG_CTRL => {
                if self.locked {
                    log::warn!("wdt: control write ignored while locked");
                    return;
                }
                self.session.set_forbidden_policy(
                    if value & CTRL_FORCE_RESET_POLICY != 0 {
                        ForbiddenFeedPolicy::ForceReset
                    } else {
                        ForbiddenFeedPolicy::IgnoreWithFault
                    },
                );
                let window = if value & CTRL_WINDOW_ENABLE != 0 {
                    Some(self.programmed_window())
                } else {
                    None
                };
                self.session.set_window(window);
                self.session
                    .set_reset_enabled(value & CTRL_RESET_ENABLE != 0);
                self.session
                    .set_warning_enabled(value & CTRL_WARN_ENABLE != 0);
                if value & CTRL_ENABLE != 0 {
                    self.session.enable();
                } else {
                    self.session.disable();
                }
            }
            REG_TIMEOUT => {
                if self.locked {
                    log::warn!("wdt: timeout write ignored while locked");
                    return;
                }
                let ticks = if value == 0 {
                    log::warn!("wdt: zero timeout substituted with one tick");
                    1
                } else {
                    value
                };
                self.session.set_timeout_ticks(u64::from(ticks));
            }
            REG_GRACE => {
                if self.locked {
                    log::warn!("wdt: grace write ignored while locked");
                    return;
                }
                self.session.set_grace_ticks(u64::from(value));
            }
            REG_WINDOW_LOW => {
                if self.locked {
                    log::warn!("wdt: window write ignored while locked");
                    return;
                }
                self.update_window_bound(value, self.window_high, offset);
            }
            REG_WINDOW_HIGH => {
                if self.locked {
                    log::warn!("wdt: window write ignored while locked");
                    return;
                }
                self.update_window_bound(self.window_low, value, offset);
            }
            REG_FEED => {
                self.session.feed(value);
            }
            REG_COUNT => {}
            REG_STATUS => {
                if value & STATUS_WARNED != 0 {
                    self.session.acknowledge();
                }
                if value & STATUS_FAULT != 0 {
                    self.session.clear_fault();
                }
            }
            _ => {}
        }
    }

    fn update_window_bound(&mut self, low: u32, high: u32, offset: u64) {
        // While the window is active the session arbitrates the write (it
        // may be locked while armed); the shadow only moves when it accepts.
        if self.session.window().is_some() {
            let applied = self.session.set_window(Some(FeedWindow {
                low: u64::from(low),
                high: u64::from(high),
            }));
            if !applied {
                return;
            }
        }
        if offset == REG_WINDOW_LOW {
            self.window_low = low;
        } else {
            self.window_high = high;
        }
    }

    /// Machine reset: a fresh session with the register-file defaults.
    pub fn reset(&mut self) {
        self.session.reset();
        self.session.set_window(None);
        self.session.set_reset_enabled(true);
        self.session.set_warning_enabled(false);
        self.session.set_timeout_ticks(u64::from(DEFAULT_TIMEOUT));
        self.session.set_grace_ticks(0);
        self.session
            .set_forbidden_policy(ForbiddenFeedPolicy::IgnoreWithFault);
        self.locked = true;
        self.window_low = 0;
        self.window_high = u32::MAX;
    }
}
