//! CPU time synchronization.
//!
//! The scheduler is advanced in coarse batches for performance, but a guest
//! read of a timer's current value must reflect elapsed time up to the
//! executing instruction. Each simulated CPU therefore buffers the virtual
//! nanoseconds it has executed since the last scheduler advance; a register
//! read that needs a fresh value asks "is a CPU currently executing this
//! access?" and, if so, flushes that CPU's buffer into the scheduler first.
//! Accesses with no active CPU context (debugger or tooling) read the
//! last-synchronized snapshot. That is correct for the dominant firmware pattern of
//! polling loops on the executing core, without paying a full sync on every
//! access from any source.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use strix_time::ClockScheduler;

/// One simulated CPU's link into the scheduler.
#[derive(Debug)]
pub struct CpuContext {
    id: usize,
    sched: ClockScheduler,
    buffered_ns: Cell<u64>,
}

impl CpuContext {
    pub fn new(id: usize, sched: &ClockScheduler) -> Self {
        Self {
            id,
            sched: sched.clone(),
            buffered_ns: Cell::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Records virtual time executed locally but not yet pushed into the
    /// scheduler.
    pub fn accumulate_ns(&self, delta_ns: u64) {
        self.buffered_ns
            .set(self.buffered_ns.get().saturating_add(delta_ns));
    }

    pub fn buffered_ns(&self) -> u64 {
        self.buffered_ns.get()
    }

    /// Flushes the locally buffered elapsed time into the scheduler, so a
    /// value computed afterwards reflects time up to the current instruction.
    pub fn sync_time(&self) {
        let buffered = self.buffered_ns.replace(0);
        if buffered > 0 {
            self.sched.advance_by(buffered);
        }
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    cpus: Vec<Rc<CpuContext>>,
    current: Option<usize>,
}

/// Tracks the machine's CPU contexts and which of them, if any, is currently
/// executing a register access.
#[derive(Debug, Clone, Default)]
pub struct CpuRegistry {
    inner: Rc<RefCell<RegistryInner>>,
}

impl CpuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_cpu(&self, cpu: Rc<CpuContext>) {
        self.inner.borrow_mut().cpus.push(cpu);
    }

    /// The CPU currently executing an access, if the access originated from
    /// one (as opposed to a debugger or tooling).
    pub fn current_cpu(&self) -> Option<Rc<CpuContext>> {
        let inner = self.inner.borrow();
        let id = inner.current?;
        inner.cpus.iter().find(|cpu| cpu.id() == id).cloned()
    }

    /// Marks `id` as the executing CPU for the duration of the returned
    /// scope. Scopes nest; the previous context is restored on drop.
    pub fn enter_access(&self, id: usize) -> CpuAccessScope {
        let previous = self.inner.borrow_mut().current.replace(id);
        CpuAccessScope {
            registry: self.clone(),
            previous,
        }
    }
}

/// RAII guard produced by [`CpuRegistry::enter_access`].
#[derive(Debug)]
pub struct CpuAccessScope {
    registry: CpuRegistry,
    previous: Option<usize>,
}

impl Drop for CpuAccessScope {
    fn drop(&mut self) {
        self.registry.inner.borrow_mut().current = self.previous;
    }
}

/// Flushes the executing CPU's buffered time, if an executing CPU exists.
/// Adapters call this on any register read that needs a fresh value.
pub fn sync_current_cpu(registry: &CpuRegistry) {
    if let Some(cpu) = registry.current_cpu() {
        cpu.sync_time();
    }
}
