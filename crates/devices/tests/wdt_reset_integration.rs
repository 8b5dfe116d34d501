//! Drives the watchdog block through its registers and checks that starving
//! it lands exactly one reset request in the platform latch, and that the
//! machine's reset handling starts a fresh session.

use strix_devices::wdt::{Wdt, WDT_FEED_KEY, WDT_UNLOCK_KEY};
use strix_devices::WdtConfig;
use strix_interrupts::IrqProbe;
use strix_platform::cpu::CpuRegistry;
use strix_platform::reset::{ResetKind, ResetLatch, ResetSink};
use strix_time::{ClockScheduler, NS_PER_SEC};
use strix_watchdog::WatchdogCallbacks;

const REG_LOCK: u64 = 0x00;
const REG_CTRL: u64 = 0x04;
const REG_TIMEOUT: u64 = 0x08;
const REG_GRACE: u64 = 0x0C;
const REG_FEED: u64 = 0x18;
const REG_STATUS: u64 = 0x20;

const CTRL_ENABLE: u32 = 1 << 0;
const CTRL_WARN_ENABLE: u32 = 1 << 1;
const CTRL_RESET_ENABLE: u32 = 1 << 2;

const STATUS_RESET_PENDING: u32 = 1 << 2;

fn wdt_wired_to(latch: &ResetLatch, warning: &IrqProbe, sched: &ClockScheduler) -> Wdt {
    let mut latch_in_cb = latch.clone();
    let callbacks = WatchdogCallbacks {
        warning_irq: Box::new(warning.clone()),
        request_reset: Some(Box::new(move || {
            latch_in_cb.request_reset(ResetKind::System);
        })),
    };
    let config = WdtConfig {
        frequency_hz: 1000,
        ..WdtConfig::default()
    };
    Wdt::new(sched, config, callbacks, CpuRegistry::new()).unwrap()
}

#[test]
fn starving_the_watchdog_requests_exactly_one_system_reset() {
    let sched = ClockScheduler::new();
    let latch = ResetLatch::new();
    let warning = IrqProbe::new();
    let mut wdt = wdt_wired_to(&latch, &warning, &sched);

    // Guest bring-up: unlock, program a 100-tick timeout, arm.
    wdt.mmio_write(REG_LOCK, WDT_UNLOCK_KEY);
    wdt.mmio_write(REG_TIMEOUT, 100);
    wdt.mmio_write(REG_CTRL, CTRL_ENABLE | CTRL_RESET_ENABLE);

    // A well-behaved guest feeds in time.
    for _ in 0..3 {
        sched.advance_by(80 * NS_PER_SEC / 1000);
        wdt.poll();
        wdt.mmio_write(REG_FEED, WDT_FEED_KEY);
    }
    assert_eq!(latch.peek(), None);

    // Then it hangs.
    sched.advance_by(100 * NS_PER_SEC / 1000);
    wdt.poll();

    assert_eq!(latch.take(), Some(ResetKind::System));
    assert_eq!(latch.requests(), 1);
    assert_ne!(wdt.mmio_read(REG_STATUS) & STATUS_RESET_PENDING, 0);

    // The platform loop applies the reset; the reborn machine can arm again.
    wdt.reset();
    assert_eq!(wdt.mmio_read(REG_STATUS), 0);
    wdt.mmio_write(REG_LOCK, WDT_UNLOCK_KEY);
    wdt.mmio_write(REG_TIMEOUT, 100);
    wdt.mmio_write(REG_CTRL, CTRL_ENABLE | CTRL_RESET_ENABLE);
    sched.advance_by(100 * NS_PER_SEC / 1000);
    wdt.poll();
    assert_eq!(latch.requests(), 2);
}

#[test]
fn two_stage_watchdog_warns_before_the_latch_sees_anything() {
    let sched = ClockScheduler::new();
    let latch = ResetLatch::new();
    let warning = IrqProbe::new();
    let mut wdt = wdt_wired_to(&latch, &warning, &sched);

    wdt.mmio_write(REG_LOCK, WDT_UNLOCK_KEY);
    wdt.mmio_write(REG_TIMEOUT, 100);
    wdt.mmio_write(REG_GRACE, 20);
    wdt.mmio_write(
        REG_CTRL,
        CTRL_ENABLE | CTRL_WARN_ENABLE | CTRL_RESET_ENABLE,
    );

    sched.advance_by(100 * NS_PER_SEC / 1000);
    wdt.poll();
    assert_eq!(warning.raises(), 1);
    assert_eq!(latch.peek(), None);

    sched.advance_by(20 * NS_PER_SEC / 1000);
    wdt.poll();
    assert_eq!(latch.take(), Some(ResetKind::System));
    assert_eq!(latch.requests(), 1);
}
