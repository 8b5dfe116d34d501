use strix_interrupts::{IrqLine, NoIrq};
use strix_time::{
    ClockScheduler, Direction, LimitTimer, LimitTimerConfig, TimerError, WorkMode,
};

/// Lifecycle of one armed watchdog instance. `ResetPending` is terminal; a
/// rebooted machine reinitializes a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogPhase {
    Idle,
    Armed,
    Warned,
    ResetPending,
}

/// What a correct-key feed outside the permitted window does. Hardware
/// variants disagree; the behaviour is explicit configuration, never
/// inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenFeedPolicy {
    /// The feed is discarded and the fault flag set; the countdown runs on.
    IgnoreWithFault,
    /// The feed itself forces the reset path.
    ForceReset,
}

/// Permitted countdown sub-range for feeds, in ticks remaining. Both bounds
/// are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub low: u64,
    pub high: u64,
}

impl FeedWindow {
    fn contains(&self, remaining: u64) -> bool {
        self.low <= remaining && remaining <= self.high
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Key and window checks passed; the countdown was reloaded.
    Accepted,
    /// The session is not accepting feeds (disabled or reset pending).
    Ignored,
    /// Key mismatch: no state change, no side effect.
    WrongKey,
    /// Correct key outside the window; handled per [`ForbiddenFeedPolicy`].
    OutsideWindow,
}

#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    pub frequency_hz: u64,
    pub divider: u32,
    /// Primary countdown length, in ticks.
    pub timeout_ticks: u64,
    /// Grace countdown armed by the warning stage, in ticks.
    pub grace_ticks: u64,
    /// Key a feed must present.
    pub feed_key: u32,
    pub window: Option<FeedWindow>,
    pub forbidden_policy: ForbiddenFeedPolicy,
    /// Raise the warning interrupt on timeout instead of resetting outright.
    pub warning_enabled: bool,
    /// Request a system reset when the (grace) countdown elapses.
    pub reset_enabled: bool,
    /// Arming is irreversible except via machine reset (write-once enable).
    pub enable_once: bool,
    /// Timeout/window fields are locked while armed.
    pub lock_while_armed: bool,
}

impl WatchdogConfig {
    /// Single-stage reset-on-timeout watchdog; no window, no key.
    pub fn new(frequency_hz: u64, timeout_ticks: u64) -> Self {
        Self {
            frequency_hz,
            divider: 1,
            timeout_ticks,
            grace_ticks: 0,
            feed_key: 0,
            window: None,
            forbidden_policy: ForbiddenFeedPolicy::IgnoreWithFault,
            warning_enabled: false,
            reset_enabled: true,
            enable_once: false,
            lock_while_armed: false,
        }
    }
}

/// Host wiring for a [`WatchdogSession`].
pub struct WatchdogCallbacks {
    /// Driven when the warning (interrupt/NMI) stage asserts or clears.
    pub warning_irq: Box<dyn IrqLine>,
    /// Called exactly once when the session reaches `ResetPending`.
    pub request_reset: Option<Box<dyn FnMut()>>,
}

impl WatchdogCallbacks {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for WatchdogCallbacks {
    fn default() -> Self {
        Self {
            warning_irq: Box::new(NoIrq),
            request_reset: None,
        }
    }
}

/// Two-phase watchdog timeout state machine built from a pair of countdown
/// timers plus key/window-gated feed logic.
///
/// The owner advances the machine's scheduler and then calls
/// [`WatchdogSession::poll`], which drains the countdown's crossing events
/// and moves the phase; no callback ever runs re-entrantly out of the
/// scheduler.
pub struct WatchdogSession {
    cfg: WatchdogConfig,
    countdown: LimitTimer,
    grace: LimitTimer,
    phase: WatchdogPhase,
    fault: bool,
    callbacks: WatchdogCallbacks,
}

impl WatchdogSession {
    pub fn new(
        sched: &ClockScheduler,
        cfg: WatchdogConfig,
        callbacks: WatchdogCallbacks,
    ) -> Result<Self, TimerError> {
        if cfg.timeout_ticks == 0 {
            return Err(TimerError::InvalidConfiguration(
                "watchdog timeout must be at least one tick",
            ));
        }
        if !cfg.warning_enabled && !cfg.reset_enabled {
            return Err(TimerError::InvalidConfiguration(
                "a timeout must surface as an interrupt or a reset",
            ));
        }
        if cfg.warning_enabled && cfg.reset_enabled && cfg.grace_ticks == 0 {
            return Err(TimerError::InvalidConfiguration(
                "the warning stage needs a nonzero grace period",
            ));
        }
        if let Some(window) = cfg.window {
            if window.low > window.high {
                return Err(TimerError::InvalidConfiguration(
                    "feed window low bound exceeds high bound",
                ));
            }
        }

        let countdown = LimitTimer::new(
            sched,
            LimitTimerConfig {
                frequency_hz: cfg.frequency_hz,
                divider: cfg.divider,
                limit: cfg.timeout_ticks,
                direction: Direction::Descending,
                mode: WorkMode::OneShot,
                enabled: false,
                event_enabled: true,
            },
        )?;
        let grace = LimitTimer::new(
            sched,
            LimitTimerConfig {
                frequency_hz: cfg.frequency_hz,
                divider: cfg.divider,
                limit: cfg.grace_ticks.max(1),
                direction: Direction::Descending,
                mode: WorkMode::OneShot,
                enabled: false,
                event_enabled: true,
            },
        )?;

        Ok(Self {
            cfg,
            countdown,
            grace,
            phase: WatchdogPhase::Idle,
            fault: false,
            callbacks,
        })
    }

    pub fn phase(&self) -> WatchdogPhase {
        self.phase
    }

    /// Set when a forbidden-window feed was discarded under
    /// [`ForbiddenFeedPolicy::IgnoreWithFault`].
    pub fn fault(&self) -> bool {
        self.fault
    }

    pub fn clear_fault(&mut self) {
        self.fault = false;
    }

    /// Ticks left on the primary countdown.
    pub fn countdown_remaining(&self) -> u64 {
        self.countdown.value()
    }

    /// Ticks left on the grace countdown (meaningful while `Warned`).
    pub fn grace_remaining(&self) -> u64 {
        self.grace.value()
    }

    pub fn timeout_ticks(&self) -> u64 {
        self.cfg.timeout_ticks
    }

    pub fn grace_ticks(&self) -> u64 {
        self.cfg.grace_ticks
    }

    pub fn window(&self) -> Option<FeedWindow> {
        self.cfg.window
    }

    pub fn warning_enabled(&self) -> bool {
        self.cfg.warning_enabled
    }

    pub fn reset_enabled(&self) -> bool {
        self.cfg.reset_enabled
    }

    pub fn forbidden_policy(&self) -> ForbiddenFeedPolicy {
        self.cfg.forbidden_policy
    }

    /// Whether timeout/window writes are currently refused.
    pub fn config_locked(&self) -> bool {
        self.cfg.lock_while_armed
            && matches!(self.phase, WatchdogPhase::Armed | WatchdogPhase::Warned)
    }

    /// Arms the watchdog. A no-op while already armed; ignored once a reset
    /// is pending.
    pub fn enable(&mut self) {
        match self.phase {
            WatchdogPhase::Idle => {
                self.countdown.set_value(self.cfg.timeout_ticks);
                self.countdown.set_enabled(true);
                self.phase = WatchdogPhase::Armed;
            }
            WatchdogPhase::Armed | WatchdogPhase::Warned => {}
            WatchdogPhase::ResetPending => {
                log::warn!("watchdog: enable ignored, reset already pending");
            }
        }
    }

    /// Disarms the watchdog. Refused (logged, state unchanged) when the
    /// enable bit is write-once or a reset is already pending.
    pub fn disable(&mut self) -> bool {
        match self.phase {
            WatchdogPhase::Idle => true,
            WatchdogPhase::ResetPending => {
                log::warn!("watchdog: disable ignored, reset already pending");
                false
            }
            WatchdogPhase::Armed | WatchdogPhase::Warned => {
                if self.cfg.enable_once {
                    log::warn!("watchdog: disable ignored, enable bit is write-once");
                    return false;
                }
                self.countdown.set_enabled(false);
                self.countdown.clear_pending();
                self.grace.set_enabled(false);
                self.grace.clear_pending();
                self.callbacks.warning_irq.set_level(false);
                self.phase = WatchdogPhase::Idle;
                true
            }
        }
    }

    /// Refreshes the countdown iff `key` matches and the countdown position
    /// lies within the configured window.
    ///
    /// A feed at the same virtual instant as the countdown's deadline wins:
    /// the reload discards the undelivered crossing, so the timeout never
    /// fires. While `Warned`, a correct-key feed acknowledges the warning
    /// (the window no longer applies; the primary countdown has already
    /// expired).
    pub fn feed(&mut self, key: u32) -> FeedOutcome {
        match self.phase {
            WatchdogPhase::Idle | WatchdogPhase::ResetPending => {
                log::debug!("watchdog: feed ignored in {:?} phase", self.phase);
                FeedOutcome::Ignored
            }
            WatchdogPhase::Armed | WatchdogPhase::Warned => {
                if key != self.cfg.feed_key {
                    log::warn!("watchdog: feed with wrong key {key:#010x} ignored");
                    return FeedOutcome::WrongKey;
                }
                if self.phase == WatchdogPhase::Armed {
                    if let Some(window) = self.cfg.window {
                        let remaining = self.countdown.value();
                        if !window.contains(remaining) {
                            return match self.cfg.forbidden_policy {
                                ForbiddenFeedPolicy::IgnoreWithFault => {
                                    log::warn!(
                                        "watchdog: feed at {remaining} ticks remaining is \
                                         outside the window, discarded"
                                    );
                                    self.fault = true;
                                    FeedOutcome::OutsideWindow
                                }
                                ForbiddenFeedPolicy::ForceReset => {
                                    log::warn!(
                                        "watchdog: feed at {remaining} ticks remaining is \
                                         outside the window, forcing reset"
                                    );
                                    self.trigger_reset();
                                    FeedOutcome::OutsideWindow
                                }
                            };
                        }
                    }
                }
                self.refresh();
                FeedOutcome::Accepted
            }
        }
    }

    /// Clears a pending warning without a key, restarting the primary
    /// countdown (the register-level W1C acknowledge path).
    pub fn acknowledge(&mut self) {
        if self.phase == WatchdogPhase::Warned {
            self.refresh();
        }
    }

    /// Changes the primary countdown length. Takes effect at the next
    /// feed/enable; refused while the configuration is locked.
    pub fn set_timeout_ticks(&mut self, ticks: u64) -> bool {
        if ticks == 0 {
            log::warn!("watchdog: zero timeout ignored");
            return false;
        }
        if self.config_locked() {
            log::warn!("watchdog: timeout write ignored while armed");
            return false;
        }
        self.cfg.timeout_ticks = ticks;
        self.countdown
            .set_limit_keep_value(ticks)
            .expect("nonzero timeout");
        true
    }

    /// Changes the grace period. Refused while the configuration is locked.
    pub fn set_grace_ticks(&mut self, ticks: u64) -> bool {
        if self.config_locked() {
            log::warn!("watchdog: grace write ignored while armed");
            return false;
        }
        if self.cfg.warning_enabled && self.cfg.reset_enabled && ticks == 0 {
            log::warn!("watchdog: zero grace period ignored");
            return false;
        }
        self.cfg.grace_ticks = ticks;
        self.grace
            .set_limit_keep_value(ticks.max(1))
            .expect("nonzero grace limit");
        true
    }

    /// Changes the feed window. Refused while the configuration is locked.
    pub fn set_window(&mut self, window: Option<FeedWindow>) -> bool {
        if let Some(w) = window {
            if w.low > w.high {
                log::warn!("watchdog: inverted feed window ignored");
                return false;
            }
        }
        if self.config_locked() {
            log::warn!("watchdog: window write ignored while armed");
            return false;
        }
        self.cfg.window = window;
        true
    }

    pub fn set_forbidden_policy(&mut self, policy: ForbiddenFeedPolicy) {
        self.cfg.forbidden_policy = policy;
    }

    /// Masks or unmasks the warning stage. Turning it off while `Warned`
    /// lowers the line but does not cancel the already-armed grace countdown.
    /// Refused when it would leave a timeout with no visible effect.
    pub fn set_warning_enabled(&mut self, enabled: bool) -> bool {
        if !enabled && !self.cfg.reset_enabled {
            log::warn!("watchdog: cannot disable both the warning and the reset path");
            return false;
        }
        if enabled && self.cfg.reset_enabled && self.cfg.grace_ticks == 0 {
            log::warn!("watchdog: warning stage needs a nonzero grace period");
            return false;
        }
        self.cfg.warning_enabled = enabled;
        if !enabled {
            self.callbacks.warning_irq.set_level(false);
        }
        true
    }

    /// Enables or disables the reset path. Refused when it would leave a
    /// timeout with no visible effect.
    pub fn set_reset_enabled(&mut self, enabled: bool) -> bool {
        if !enabled && !self.cfg.warning_enabled {
            log::warn!("watchdog: cannot disable both the warning and the reset path");
            return false;
        }
        if enabled && self.cfg.warning_enabled && self.cfg.grace_ticks == 0 {
            log::warn!("watchdog: warning stage needs a nonzero grace period");
            return false;
        }
        self.cfg.reset_enabled = enabled;
        true
    }

    /// Prescales both countdowns.
    pub fn set_divider(&mut self, divider: u32) -> Result<(), TimerError> {
        self.countdown.set_divider(divider)?;
        self.grace.set_divider(divider)?;
        self.cfg.divider = divider;
        Ok(())
    }

    /// Drains crossing events and moves the phase. Call after advancing the
    /// machine's scheduler and before observing any watchdog state.
    pub fn poll(&mut self) {
        if !self.countdown.take_events().is_empty() && self.phase == WatchdogPhase::Armed {
            self.on_primary_timeout();
        }
        if !self.grace.take_events().is_empty()
            && self.phase == WatchdogPhase::Warned
            && self.cfg.reset_enabled
        {
            self.trigger_reset();
        }
    }

    /// Machine reset: back to a fresh session. Configuration survives; the
    /// adapter restores its own register defaults on top.
    pub fn reset(&mut self) {
        self.countdown.reset();
        self.grace.reset();
        self.callbacks.warning_irq.set_level(false);
        self.phase = WatchdogPhase::Idle;
        self.fault = false;
    }

    fn refresh(&mut self) {
        self.countdown.set_value(self.cfg.timeout_ticks);
        self.countdown.clear_pending();
        self.countdown.set_enabled(true);
        if self.phase == WatchdogPhase::Warned {
            self.grace.set_enabled(false);
            self.grace.clear_pending();
            self.callbacks.warning_irq.set_level(false);
        }
        self.phase = WatchdogPhase::Armed;
    }

    fn on_primary_timeout(&mut self) {
        if self.cfg.warning_enabled {
            self.callbacks.warning_irq.set_level(true);
            self.phase = WatchdogPhase::Warned;
            if self.cfg.reset_enabled {
                self.grace.set_value(self.cfg.grace_ticks);
                self.grace.set_enabled(true);
            }
        } else {
            self.trigger_reset();
        }
    }

    fn trigger_reset(&mut self) {
        if self.phase == WatchdogPhase::ResetPending {
            return;
        }
        self.phase = WatchdogPhase::ResetPending;
        self.countdown.set_enabled(false);
        self.countdown.clear_pending();
        self.grace.set_enabled(false);
        self.grace.clear_pending();
        if let Some(request_reset) = self.callbacks.request_reset.as_mut() {
            request_reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use strix_interrupts::IrqProbe;
    use strix_time::NS_PER_SEC;

    const KEY: u32 = 0xB480_A602;

    struct Rig {
        sched: ClockScheduler,
        session: WatchdogSession,
        warning: IrqProbe,
        resets: Rc<Cell<u32>>,
    }

    fn rig(cfg: WatchdogConfig) -> Rig {
        let sched = ClockScheduler::new();
        let warning = IrqProbe::new();
        let resets = Rc::new(Cell::new(0u32));
        let resets_in_cb = resets.clone();
        let callbacks = WatchdogCallbacks {
            warning_irq: Box::new(warning.clone()),
            request_reset: Some(Box::new(move || {
                resets_in_cb.set(resets_in_cb.get() + 1);
            })),
        };
        let session = WatchdogSession::new(&sched, cfg, callbacks).unwrap();
        Rig {
            sched,
            session,
            warning,
            resets,
        }
    }

    /// 1000-tick countdown at 1kHz: one tick per millisecond.
    fn keyed_config() -> WatchdogConfig {
        let mut cfg = WatchdogConfig::new(1000, 1000);
        cfg.feed_key = KEY;
        cfg
    }

    fn advance_ticks(rig: &mut Rig, ticks: u64) {
        rig.sched.advance_by(ticks * NS_PER_SEC / 1000);
        rig.session.poll();
    }

    #[test]
    fn feed_with_the_correct_key_restarts_the_countdown() {
        let mut rig = rig(keyed_config());
        rig.session.enable();

        advance_ticks(&mut rig, 600);
        assert_eq!(rig.session.countdown_remaining(), 400);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        assert_eq!(rig.session.countdown_remaining(), 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);

        // Regular feeding keeps the dog quiet indefinitely.
        for _ in 0..10 {
            advance_ticks(&mut rig, 900);
            assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        }
        assert_eq!(rig.resets.get(), 0);
        assert_eq!(rig.warning.raises(), 0);
    }

    #[test]
    fn wrong_key_changes_nothing() {
        let mut rig = rig(keyed_config());
        rig.session.enable();

        advance_ticks(&mut rig, 600);
        assert_eq!(rig.session.feed(0xDEAD_BEEF), FeedOutcome::WrongKey);
        assert_eq!(rig.session.countdown_remaining(), 400);
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);
        assert!(!rig.session.fault());
    }

    #[test]
    fn single_stage_timeout_requests_reset_exactly_once() {
        let mut rig = rig(keyed_config());
        rig.session.enable();

        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::ResetPending);
        assert_eq!(rig.resets.get(), 1);
        assert_eq!(rig.warning.raises(), 0);

        // Terminal: more time and more polls change nothing.
        advance_ticks(&mut rig, 5000);
        assert_eq!(rig.resets.get(), 1);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Ignored);
    }

    #[test]
    fn two_phase_timeout_warns_then_resets() {
        let mut cfg = keyed_config();
        cfg.warning_enabled = true;
        cfg.grace_ticks = 200;
        let mut rig = rig(cfg);
        rig.session.enable();

        // Full period: exactly one warning interrupt, no reset yet.
        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::Warned);
        assert_eq!(rig.warning.raises(), 1);
        assert!(rig.warning.is_asserted());
        assert_eq!(rig.resets.get(), 0);

        // Grace elapses without an acknowledging feed: exactly one reset.
        advance_ticks(&mut rig, 200);
        assert_eq!(rig.session.phase(), WatchdogPhase::ResetPending);
        assert_eq!(rig.resets.get(), 1);
        assert_eq!(rig.warning.raises(), 1);
    }

    #[test]
    fn feed_during_the_grace_period_acknowledges_the_warning() {
        let mut cfg = keyed_config();
        cfg.warning_enabled = true;
        cfg.grace_ticks = 200;
        let mut rig = rig(cfg);
        rig.session.enable();

        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::Warned);

        advance_ticks(&mut rig, 100);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);
        assert!(!rig.warning.is_asserted());
        assert_eq!(rig.session.countdown_remaining(), 1000);

        // The cancelled grace countdown must not fire later.
        advance_ticks(&mut rig, 500);
        assert_eq!(rig.resets.get(), 0);
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);
    }

    #[test]
    fn feed_inside_the_window_is_accepted() {
        let mut cfg = keyed_config();
        cfg.window = Some(FeedWindow { low: 0, high: 100 });
        cfg.forbidden_policy = ForbiddenFeedPolicy::ForceReset;
        let mut rig = rig(cfg);
        rig.session.enable();

        advance_ticks(&mut rig, 950);
        assert_eq!(rig.session.countdown_remaining(), 50);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        assert_eq!(rig.session.countdown_remaining(), 1000);
        assert_eq!(rig.resets.get(), 0);
    }

    #[test]
    fn forbidden_window_feed_forces_reset_under_that_policy() {
        let mut cfg = keyed_config();
        cfg.window = Some(FeedWindow { low: 0, high: 100 });
        cfg.forbidden_policy = ForbiddenFeedPolicy::ForceReset;
        let mut rig = rig(cfg);
        rig.session.enable();

        advance_ticks(&mut rig, 500);
        assert_eq!(rig.session.countdown_remaining(), 500);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::OutsideWindow);
        assert_eq!(rig.session.phase(), WatchdogPhase::ResetPending);
        assert_eq!(rig.resets.get(), 1);
    }

    #[test]
    fn forbidden_window_feed_is_discarded_under_the_fault_policy() {
        let mut cfg = keyed_config();
        cfg.window = Some(FeedWindow { low: 0, high: 100 });
        let mut rig = rig(cfg);
        rig.session.enable();

        advance_ticks(&mut rig, 500);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::OutsideWindow);
        assert!(rig.session.fault());
        // The countdown kept running.
        assert_eq!(rig.session.countdown_remaining(), 500);
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);
        assert_eq!(rig.resets.get(), 0);

        rig.session.clear_fault();
        assert!(!rig.session.fault());
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        let mut cfg = keyed_config();
        cfg.window = Some(FeedWindow { low: 100, high: 300 });
        let mut rig = rig(cfg);
        rig.session.enable();

        // remaining == high: accepted.
        advance_ticks(&mut rig, 700);
        assert_eq!(rig.session.countdown_remaining(), 300);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);

        // remaining == high + 1: rejected.
        advance_ticks(&mut rig, 699);
        assert_eq!(rig.session.countdown_remaining(), 301);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::OutsideWindow);

        // remaining == low: accepted.
        advance_ticks(&mut rig, 201);
        assert_eq!(rig.session.countdown_remaining(), 100);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
    }

    #[test]
    fn feed_at_the_deadline_instant_suppresses_the_crossing() {
        let mut rig = rig(keyed_config());
        rig.session.enable();

        // Advance exactly to the deadline, but feed before the poll that
        // would deliver the crossing: the feed wins.
        rig.sched.advance_by(1000 * NS_PER_SEC / 1000);
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        rig.session.poll();
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);
        assert_eq!(rig.resets.get(), 0);
        assert_eq!(rig.session.countdown_remaining(), 1000);
    }

    #[test]
    fn masking_the_warning_does_not_cancel_the_pending_reset() {
        let mut cfg = keyed_config();
        cfg.warning_enabled = true;
        cfg.grace_ticks = 200;
        let mut rig = rig(cfg);
        rig.session.enable();

        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::Warned);

        assert!(rig.session.set_warning_enabled(false));
        assert!(!rig.warning.is_asserted());

        advance_ticks(&mut rig, 200);
        assert_eq!(rig.session.phase(), WatchdogPhase::ResetPending);
        assert_eq!(rig.resets.get(), 1);
    }

    #[test]
    fn write_once_enable_refuses_disarming() {
        let mut cfg = keyed_config();
        cfg.enable_once = true;
        let mut rig = rig(cfg);
        rig.session.enable();

        assert!(!rig.session.disable());
        assert_eq!(rig.session.phase(), WatchdogPhase::Armed);

        // Only a machine reset disarms it.
        rig.session.reset();
        assert_eq!(rig.session.phase(), WatchdogPhase::Idle);
    }

    #[test]
    fn timeout_and_window_writes_are_locked_while_armed() {
        let mut cfg = keyed_config();
        cfg.lock_while_armed = true;
        let mut rig = rig(cfg);

        assert!(rig.session.set_timeout_ticks(2000));
        rig.session.enable();
        assert!(rig.session.config_locked());

        assert!(!rig.session.set_timeout_ticks(10));
        assert!(!rig.session.set_window(Some(FeedWindow { low: 0, high: 1 })));
        assert_eq!(rig.session.timeout_ticks(), 2000);
        assert_eq!(rig.session.window(), None);
    }

    #[test]
    fn timeout_writes_while_armed_apply_at_the_next_feed() {
        let mut rig = rig(keyed_config());
        rig.session.enable();

        advance_ticks(&mut rig, 400);
        assert!(rig.session.set_timeout_ticks(2000));
        // The running countdown is unaffected...
        assert_eq!(rig.session.countdown_remaining(), 600);
        // ...and the next feed reloads to the new timeout.
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Accepted);
        assert_eq!(rig.session.countdown_remaining(), 2000);
    }

    #[test]
    fn a_timeout_must_surface_somewhere() {
        let sched = ClockScheduler::new();
        let mut cfg = WatchdogConfig::new(1000, 1000);
        cfg.reset_enabled = false;
        assert!(WatchdogSession::new(&sched, cfg, WatchdogCallbacks::default()).is_err());

        let mut rig = rig(keyed_config());
        assert!(!rig.session.set_reset_enabled(false));
    }

    #[test]
    fn machine_reset_starts_a_fresh_session() {
        let mut rig = rig(keyed_config());
        rig.session.enable();
        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.session.phase(), WatchdogPhase::ResetPending);

        rig.session.reset();
        assert_eq!(rig.session.phase(), WatchdogPhase::Idle);
        assert!(!rig.session.fault());

        rig.session.enable();
        advance_ticks(&mut rig, 1000);
        assert_eq!(rig.resets.get(), 2);
    }

    #[test]
    fn feeding_an_idle_watchdog_is_ignored() {
        let mut rig = rig(keyed_config());
        assert_eq!(rig.session.feed(KEY), FeedOutcome::Ignored);
        advance_ticks(&mut rig, 5000);
        assert_eq!(rig.resets.get(), 0);
    }
}
