//! Machine timer: a 64-bit free-running counter with a compare register.
//!
//! Models the `mtime`/`mtimecmp` idiom: the interrupt line is raised when the
//! counter reaches the compare target and stays asserted until the guest
//! writes a new target. A target already in the past raises immediately.
//!
//! Reads of the counter reflect elapsed time up to the executing instruction:
//! the access path flushes the current CPU's locally buffered time before the
//! value is computed. Accesses with no CPU context (debugger/tooling) see the
//! last-synchronized snapshot.

use strix_interrupts::IrqLine;
use strix_platform::cpu::{sync_current_cpu, CpuRegistry};
use strix_time::{ClockScheduler, CompareTimer, CompareTimerConfig, TimerError};

pub const MTIMER_MMIO_SIZE: u64 = 0x10;

const REG_MTIME_LO: u64 = 0x00;
const REG_MTIME_HI: u64 = 0x04;
const REG_MTIMECMP_LO: u64 = 0x08;
const REG_MTIMECMP_HI: u64 = 0x0C;

pub struct Mtimer {
    sched: ClockScheduler,
    registry: CpuRegistry,
    timer: CompareTimer,
    compare: u64,
}

impl Mtimer {
    pub fn new(
        sched: &ClockScheduler,
        frequency_hz: u64,
        registry: CpuRegistry,
    ) -> Result<Self, TimerError> {
        let timer = CompareTimer::new(sched, CompareTimerConfig::new(frequency_hz))?;
        Ok(Self {
            sched: sched.clone(),
            registry,
            timer,
            compare: u64::MAX,
        })
    }

    pub fn mtime(&self) -> u64 {
        self.timer.value()
    }

    pub fn mtimecmp(&self) -> u64 {
        self.compare
    }

    /// Drains the compare crossing, if one elapsed, into the interrupt line.
    pub fn poll(&mut self, irq: &mut impl IrqLine) {
        // Deliver a deadline that landed exactly on the current instant
        // (a compare written at or below the counter) without waiting for
        // the machine loop.
        self.sched.advance_to(self.sched.now_ns());
        if !self.timer.take_events().is_empty() {
            irq.set_level(true);
        }
    }

    pub fn mmio_read(&mut self, offset: u64, irq: &mut impl IrqLine) -> u32 {
        sync_current_cpu(&self.registry);
        self.poll(irq);

        match offset {
            REG_MTIME_LO => self.timer.value() as u32,
            REG_MTIME_HI => (self.timer.value() >> 32) as u32,
            REG_MTIMECMP_LO => self.compare as u32,
            REG_MTIMECMP_HI => (self.compare >> 32) as u32,
            _ => 0,
        }
    }

    pub fn mmio_write(&mut self, offset: u64, value: u32, irq: &mut impl IrqLine) {
        sync_current_cpu(&self.registry);
        self.poll(irq);

        match offset {
            REG_MTIME_LO => {
                let mtime = (self.mtime() & 0xFFFF_FFFF_0000_0000) | u64::from(value);
                self.timer.set_value(mtime);
                self.rearm(irq);
            }
            REG_MTIME_HI => {
                let mtime = (self.mtime() & 0x0000_0000_FFFF_FFFF) | (u64::from(value) << 32);
                self.timer.set_value(mtime);
                self.rearm(irq);
            }
            REG_MTIMECMP_LO => {
                self.compare = (self.compare & 0xFFFF_FFFF_0000_0000) | u64::from(value);
                self.rearm(irq);
            }
            REG_MTIMECMP_HI => {
                self.compare =
                    (self.compare & 0x0000_0000_FFFF_FFFF) | (u64::from(value) << 32);
                self.rearm(irq);
            }
            _ => {}
        }
    }

    /// Writing either half of the compare (or moving the counter) lowers the
    /// line and re-arms the next firing.
    fn rearm(&mut self, irq: &mut impl IrqLine) {
        irq.set_level(false);
        self.timer.set_compare(self.compare);
        self.poll(irq);
    }

    /// Machine reset: counter back to zero, compare parked at the maximum.
    pub fn reset(&mut self, irq: &mut impl IrqLine) {
        self.compare = u64::MAX;
        self.timer.reset();
        self.timer.set_compare(self.compare);
        irq.set_level(false);
    }
}
