//! The CPU time-sync protocol observed through device registers: a read from
//! the executing CPU reflects its locally buffered time, a tooling read does
//! not, and a watchdog window decision is taken on the synced position.

use std::rc::Rc;

use strix_devices::wdt::{Wdt, WDT_FEED_KEY, WDT_UNLOCK_KEY};
use strix_devices::{Mtimer, WdtConfig};
use strix_interrupts::NoIrq;
use strix_platform::cpu::{CpuContext, CpuRegistry};
use strix_time::{ClockScheduler, NS_PER_SEC};
use strix_watchdog::WatchdogCallbacks;

const REG_MTIME_LO: u64 = 0x00;

const REG_LOCK: u64 = 0x00;
const REG_CTRL: u64 = 0x04;
const REG_TIMEOUT: u64 = 0x08;
const REG_WINDOW_LOW: u64 = 0x10;
const REG_WINDOW_HIGH: u64 = 0x14;
const REG_FEED: u64 = 0x18;
const REG_COUNT: u64 = 0x1C;
const REG_STATUS: u64 = 0x20;

const CTRL_ENABLE: u32 = 1 << 0;
const CTRL_RESET_ENABLE: u32 = 1 << 2;
const CTRL_WINDOW_ENABLE: u32 = 1 << 3;

const STATUS_FAULT: u32 = 1 << 1;

#[test]
fn mtime_reads_differ_between_guest_and_tooling() {
    let sched = ClockScheduler::new();
    let registry = CpuRegistry::new();
    let cpu = Rc::new(CpuContext::new(0, &sched));
    registry.add_cpu(cpu.clone());

    let mut mtimer = Mtimer::new(&sched, 1000, registry.clone()).unwrap();
    let mut irq = NoIrq;

    sched.advance_by(NS_PER_SEC);
    cpu.accumulate_ns(NS_PER_SEC / 2);

    // Debugger view: the batch-advanced snapshot.
    assert_eq!(mtimer.mmio_read(REG_MTIME_LO, &mut irq), 1000);

    // Guest view: buffered execution time is flushed before the read.
    {
        let _scope = registry.enter_access(0);
        assert_eq!(mtimer.mmio_read(REG_MTIME_LO, &mut irq), 1500);
    }

    // The flush advanced shared virtual time for everyone.
    assert_eq!(mtimer.mmio_read(REG_MTIME_LO, &mut irq), 1500);
}

#[test]
fn windowed_feed_is_judged_on_the_synced_countdown_position() {
    let sched = ClockScheduler::new();
    let registry = CpuRegistry::new();
    let cpu = Rc::new(CpuContext::new(0, &sched));
    registry.add_cpu(cpu.clone());

    let config = WdtConfig {
        frequency_hz: 1000,
        ..WdtConfig::default()
    };
    let mut wdt = Wdt::new(
        &sched,
        config,
        WatchdogCallbacks::default(),
        registry.clone(),
    )
    .unwrap();

    // 1000-tick timeout, feeds only accepted in the last 100 ticks.
    wdt.mmio_write(REG_LOCK, WDT_UNLOCK_KEY);
    wdt.mmio_write(REG_TIMEOUT, 1000);
    wdt.mmio_write(REG_WINDOW_LOW, 0);
    wdt.mmio_write(REG_WINDOW_HIGH, 100);
    wdt.mmio_write(
        REG_CTRL,
        CTRL_ENABLE | CTRL_RESET_ENABLE | CTRL_WINDOW_ENABLE,
    );

    // Batch time says 150 ticks remain (outside the window), but the
    // executing CPU has run another 80ms the scheduler has not seen yet.
    sched.advance_by(850 * NS_PER_SEC / 1000);
    cpu.accumulate_ns(80 * NS_PER_SEC / 1000);

    let _scope = registry.enter_access(0);
    assert_eq!(wdt.mmio_read(REG_COUNT), 70);

    // The feed lands inside the window precisely because the write path
    // synced first.
    wdt.mmio_write(REG_FEED, WDT_FEED_KEY);
    assert_eq!(wdt.mmio_read(REG_STATUS) & STATUS_FAULT, 0);
    assert_eq!(wdt.mmio_read(REG_COUNT), 1000);
}
