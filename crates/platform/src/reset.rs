use std::cell::Cell;
use std::rc::Rc;

/// Reset request kind emitted by timeout sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetKind {
    /// Reset the CPU core(s) while leaving device state intact (warm reset).
    Cpu,
    /// Full system reset (CPU + devices + firmware re-entry).
    System,
}

/// Platform-level sink for reset requests coming from watchdog peripherals.
///
/// A device model must *not* reset the system from inside its own register
/// handler; it reports the request to a sink and the platform coordinator
/// applies the reset at a safe boundary. The requesting peripheral has no
/// visibility into post-reset behaviour.
pub trait ResetSink {
    fn request_reset(&mut self, kind: ResetKind);
}

impl<F> ResetSink for F
where
    F: FnMut(ResetKind),
{
    fn request_reset(&mut self, kind: ResetKind) {
        self(kind);
    }
}

/// Cloneable reset request latch bridging device requests into the platform
/// loop.
///
/// The latch stores at most one pending request ([`ResetKind::System`] wins
/// over [`ResetKind::Cpu`]) and counts every request it has seen, so tests
/// can assert a timeout produced exactly one.
#[derive(Debug, Clone, Default)]
pub struct ResetLatch {
    pending: Rc<Cell<Option<ResetKind>>>,
    requests: Rc<Cell<u32>>,
}

impl ResetLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the currently pending request without clearing it.
    pub fn peek(&self) -> Option<ResetKind> {
        self.pending.get()
    }

    /// Takes and clears the pending request.
    pub fn take(&self) -> Option<ResetKind> {
        let pending = self.pending.get();
        self.pending.set(None);
        pending
    }

    pub fn clear(&self) {
        self.pending.set(None);
    }

    /// Total number of requests observed since construction.
    pub fn requests(&self) -> u32 {
        self.requests.get()
    }
}

impl ResetSink for ResetLatch {
    fn request_reset(&mut self, kind: ResetKind) {
        self.requests.set(self.requests.get() + 1);
        let next = match (self.pending.get(), kind) {
            (Some(ResetKind::System), _) | (_, ResetKind::System) => ResetKind::System,
            (Some(ResetKind::Cpu), _) | (None, ResetKind::Cpu) => ResetKind::Cpu,
        };
        self.pending.set(Some(next));
    }
}
