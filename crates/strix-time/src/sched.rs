//! Clock scheduler: the per-machine table of timer entries.
//!
//! # Design
//!
//! Every timer in the machine is a [`ClockScheduler`] entry keyed by an opaque
//! [`TimerHandle`]. The scheduler is the authority on virtual time: the
//! machine's time loop calls [`ClockScheduler::advance_to`] in coarse batches,
//! and entries only do work when one of their deadlines has actually elapsed.
//! A timer's current reading is never maintained by a live counter; it is
//! projected on demand from the elapsed virtual nanoseconds since the entry's
//! last synchronization point.
//!
//! Crossings are delivered as [`TimerEvent`]s appended to a per-entry queue,
//! which the owning device drains in its own update step. This keeps delivery
//! exactly-once, avoids re-entrant callback chains, and lets an owner discard
//! a stale crossing (e.g. a watchdog feed racing its own deadline).
//!
//! All entry mutation for one scheduler instance is serialized by a single
//! mutex: advances originate from the simulated-CPU side while
//! reconfiguration originates from register writes, and a reconfiguration
//! racing an imminent firing must never drop that firing. The lock is never
//! held while owner code runs.

use std::sync::{Arc, Mutex};

use crate::error::TimerError;

pub const NS_PER_SEC: u64 = 1_000_000_000;

/// Opaque key naming a scheduler entry. Generation-tagged so a recycled slot
/// never aliases a stale handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    /// Crossing the limit disables the entry until explicitly re-armed.
    OneShot,
    /// Crossing the limit reloads the value and reschedules atomically.
    Periodic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEventKind {
    LimitReached,
    CompareReached,
}

/// A crossing, delivered exactly once through the owning entry's queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub handle: TimerHandle,
    pub kind: TimerEventKind,
    /// Virtual timestamp of the crossing itself (the elapsed deadline), which
    /// may be earlier than the instant the advance delivering it ran.
    pub at_ns: u64,
}

/// Scheduling parameters of one entry, used at registration and inside
/// [`ClockScheduler::exchange`]. `value` is the tick reading at the entry's
/// synchronization point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerParams {
    pub frequency_hz: u64,
    pub divider: u32,
    pub direction: Direction,
    pub mode: WorkMode,
    pub limit: u64,
    pub value: u64,
    pub enabled: bool,
    pub event_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Fire when the value crosses the limit (ascending) or zero (descending).
    Limit,
    /// Fire once when the value reaches `compare`; the owner re-arms by
    /// writing a new compare target.
    Compare { compare: u64, armed: bool },
}

#[derive(Debug)]
struct Entry {
    frequency_hz: u64,
    divider: u32,
    direction: Direction,
    mode: WorkMode,
    limit: u64,
    enabled: bool,
    event_enabled: bool,
    target: Target,

    /// Tick reading at `anchor_ns`.
    base_value: u64,
    /// Virtual time of the last synchronization point.
    anchor_ns: u64,
    /// Sub-tick progress at the anchor, in numerator units of
    /// `nanoseconds x frequency` (always `< divider * NS_PER_SEC`).
    residue: u64,
    /// Absolute virtual deadline of the next crossing, when one is armed.
    deadline_ns: Option<u64>,

    pending: Vec<TimerEvent>,
}

#[derive(Debug, Clone, Copy)]
struct Projection {
    value: u64,
    enabled: bool,
    crossed: bool,
}

impl Entry {
    fn denominator(&self) -> u128 {
        u128::from(self.divider) * u128::from(NS_PER_SEC)
    }

    /// Whole ticks elapsed between the anchor and `now`, and the residue left
    /// after consuming them.
    fn elapsed_ticks(&self, now_ns: u64) -> (u128, u64) {
        let delta = now_ns.saturating_sub(self.anchor_ns);
        let acc = u128::from(delta) * u128::from(self.frequency_hz) + u128::from(self.residue);
        let denom = self.denominator();
        (acc / denom, (acc % denom) as u64)
    }

    /// Observable state at `now`, without mutating the entry.
    fn project(&self, now_ns: u64) -> Projection {
        if !self.enabled {
            return Projection {
                value: self.base_value,
                enabled: false,
                crossed: false,
            };
        }
        let (ticks, _) = self.elapsed_ticks(now_ns);
        match self.target {
            Target::Compare { compare, armed } => {
                let pos = u128::from(self.base_value) + ticks;
                Projection {
                    value: pos as u64,
                    enabled: true,
                    crossed: armed && pos >= u128::from(compare),
                }
            }
            Target::Limit => match self.direction {
                Direction::Ascending => {
                    let pos = u128::from(self.base_value) + ticks;
                    // A zero limit is only reachable with events disabled;
                    // treat it as a one-tick period so the modular reload
                    // stays defined.
                    let limit = u128::from(self.limit.max(1));
                    if pos >= limit {
                        match self.mode {
                            WorkMode::Periodic => Projection {
                                value: ((pos - limit) % limit) as u64,
                                enabled: true,
                                crossed: true,
                            },
                            WorkMode::OneShot => Projection {
                                value: self.limit,
                                enabled: false,
                                crossed: true,
                            },
                        }
                    } else {
                        Projection {
                            value: pos as u64,
                            enabled: true,
                            crossed: false,
                        }
                    }
                }
                Direction::Descending => {
                    let base = u128::from(self.base_value);
                    if ticks >= base {
                        match self.mode {
                            WorkMode::Periodic => {
                                let period = self.limit.max(1);
                                let rem = (ticks - base) % u128::from(period);
                                Projection {
                                    value: period - rem as u64,
                                    enabled: true,
                                    crossed: true,
                                }
                            }
                            WorkMode::OneShot => Projection {
                                value: 0,
                                enabled: false,
                                crossed: true,
                            },
                        }
                    } else {
                        Projection {
                            value: (base - ticks) as u64,
                            enabled: true,
                            crossed: false,
                        }
                    }
                }
            },
        }
    }

    /// Folds elapsed time into the stored value and re-anchors at `now`.
    /// Returns whether a crossing elapsed since the previous anchor.
    fn sync(&mut self, now_ns: u64) -> bool {
        if !self.enabled {
            self.anchor_ns = now_ns;
            return false;
        }
        let (_, residue) = self.elapsed_ticks(now_ns);
        let projected = self.project(now_ns);
        self.base_value = projected.value;
        self.enabled = projected.enabled;
        self.anchor_ns = now_ns;
        self.residue = if projected.enabled { residue } else { 0 };
        if projected.crossed {
            if let Target::Compare { armed, .. } = &mut self.target {
                *armed = false;
            }
        }
        projected.crossed
    }

    /// Absolute deadline of the next crossing, computed from the (synced)
    /// stored state. `None` when nothing is armed.
    fn next_deadline(&self, now_ns: u64) -> Option<u64> {
        if !self.enabled || !self.event_enabled {
            return None;
        }
        let needed = match self.target {
            Target::Compare { armed: false, .. } => return None,
            Target::Compare { compare, armed: true } => compare.saturating_sub(self.base_value),
            Target::Limit => match self.direction {
                Direction::Ascending => self.limit.saturating_sub(self.base_value),
                Direction::Descending => self.base_value,
            },
        };
        if needed == 0 {
            return Some(now_ns);
        }
        let numer = u128::from(needed) * self.denominator() - u128::from(self.residue);
        let freq = u128::from(self.frequency_hz);
        let dt = (numer + freq - 1) / freq;
        // A deadline past the end of u64 virtual time never elapses; park it
        // at the maximum instead of wrapping.
        Some(now_ns.saturating_add(u64::try_from(dt).unwrap_or(u64::MAX)))
    }

    fn event_kind(&self) -> TimerEventKind {
        match self.target {
            Target::Limit => TimerEventKind::LimitReached,
            Target::Compare { .. } => TimerEventKind::CompareReached,
        }
    }

    fn to_params(&self) -> TimerParams {
        TimerParams {
            frequency_hz: self.frequency_hz,
            divider: self.divider,
            direction: self.direction,
            mode: self.mode,
            limit: self.limit,
            value: self.base_value,
            enabled: self.enabled,
            event_enabled: self.event_enabled,
        }
    }
}

fn validate(params: &TimerParams, is_compare: bool) -> Result<(), TimerError> {
    if params.frequency_hz == 0 {
        return Err(TimerError::InvalidConfiguration(
            "frequency must be at least 1 Hz",
        ));
    }
    if params.divider == 0 {
        return Err(TimerError::InvalidConfiguration(
            "divider must be at least 1",
        ));
    }
    if params.event_enabled && params.limit == 0 {
        return Err(TimerError::InvalidConfiguration(
            "limit must be nonzero while events are enabled",
        ));
    }
    if is_compare && params.direction == Direction::Descending {
        return Err(TimerError::InvalidConfiguration(
            "compare timers count upwards only",
        ));
    }
    Ok(())
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug)]
struct SchedInner {
    now_ns: u64,
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl SchedInner {
    fn entry(&self, handle: TimerHandle) -> &Entry {
        let slot = &self.slots[handle.index as usize];
        assert_eq!(slot.generation, handle.generation, "stale timer handle");
        slot.entry.as_ref().expect("unregistered timer handle")
    }

    fn entry_mut(&mut self, handle: TimerHandle) -> &mut Entry {
        let slot = &mut self.slots[handle.index as usize];
        assert_eq!(slot.generation, handle.generation, "stale timer handle");
        slot.entry.as_mut().expect("unregistered timer handle")
    }
}

/// Cheaply cloneable handle to one machine's timer table.
#[derive(Debug, Clone)]
pub struct ClockScheduler {
    inner: Arc<Mutex<SchedInner>>,
}

impl Default for ClockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockScheduler {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedInner {
                now_ns: 0,
                slots: Vec::new(),
                free: Vec::new(),
            })),
        }
    }

    /// Current virtual time, in nanoseconds since machine reset.
    pub fn now_ns(&self) -> u64 {
        self.inner.lock().unwrap().now_ns
    }

    /// Registers a limit-target entry and returns its handle.
    pub fn register_limit(&self, params: TimerParams) -> Result<TimerHandle, TimerError> {
        self.register(params, Target::Limit)
    }

    /// Registers a compare-target entry. The compare target starts armed.
    pub fn register_compare(
        &self,
        params: TimerParams,
        compare: u64,
    ) -> Result<TimerHandle, TimerError> {
        self.register(params, Target::Compare { compare, armed: true })
    }

    fn register(&self, params: TimerParams, target: Target) -> Result<TimerHandle, TimerError> {
        validate(&params, matches!(target, Target::Compare { .. }))?;
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now_ns;
        let mut entry = Entry {
            frequency_hz: params.frequency_hz,
            divider: params.divider,
            direction: params.direction,
            mode: params.mode,
            limit: params.limit,
            enabled: params.enabled,
            event_enabled: params.event_enabled,
            target,
            base_value: params.value,
            anchor_ns: now,
            residue: 0,
            deadline_ns: None,
            pending: Vec::new(),
        };
        entry.deadline_ns = entry.next_deadline(now);

        let index = match inner.free.pop() {
            Some(index) => {
                inner.slots[index as usize].entry = Some(entry);
                index
            }
            None => {
                inner.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                (inner.slots.len() - 1) as u32
            }
        };
        Ok(TimerHandle {
            index,
            generation: inner.slots[index as usize].generation,
        })
    }

    /// Removes an entry. Stale handles are ignored so facades can drop
    /// unconditionally.
    pub fn unregister(&self, handle: TimerHandle) {
        let mut inner = self.inner.lock().unwrap();
        let Some(slot) = inner.slots.get_mut(handle.index as usize) else {
            return;
        };
        if slot.generation != handle.generation || slot.entry.is_none() {
            return;
        }
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(handle.index);
    }

    /// Advances virtual time to `now_ns`, delivering at most one crossing
    /// event per elapsed entry, in deadline order. Entries whose deadline has
    /// not elapsed are untouched.
    pub fn advance_to(&self, now_ns: u64) {
        let mut inner = self.inner.lock().unwrap();
        if now_ns < inner.now_ns {
            return;
        }
        inner.now_ns = now_ns;

        let mut due: Vec<(u64, u32)> = Vec::new();
        for (index, slot) in inner.slots.iter().enumerate() {
            if let Some(entry) = &slot.entry {
                if let Some(deadline) = entry.deadline_ns {
                    if entry.enabled && deadline <= now_ns {
                        due.push((deadline, index as u32));
                    }
                }
            }
        }
        if due.is_empty() {
            return;
        }
        due.sort_unstable();

        for (deadline, index) in due {
            let slot = &mut inner.slots[index as usize];
            let generation = slot.generation;
            let entry = slot.entry.as_mut().expect("due entry vanished");
            let crossed = entry.sync(now_ns);
            if crossed && entry.event_enabled {
                entry.pending.push(TimerEvent {
                    handle: TimerHandle { index, generation },
                    kind: entry.event_kind(),
                    at_ns: deadline,
                });
            }
            entry.deadline_ns = entry.next_deadline(now_ns);
        }
    }

    /// Advances virtual time by `delta_ns` nanoseconds.
    ///
    /// # Panics
    ///
    /// Panics if advancing would overflow `u64`. (`u64` nanoseconds is ~584
    /// years of virtual time.)
    pub fn advance_by(&self, delta_ns: u64) {
        let now = self.now_ns();
        self.advance_to(
            now.checked_add(delta_ns)
                .expect("virtual clock overflowed u64::MAX"),
        );
    }

    /// Lazily computed current reading of an entry. Pure: two reads with no
    /// intervening advance are identical.
    pub fn value(&self, handle: TimerHandle) -> u64 {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entry(handle);
        entry.project(inner.now_ns).value
    }

    /// Effective enabled state (a one-shot whose crossing has elapsed reads
    /// as disabled even before the next advance folds it).
    pub fn is_enabled(&self, handle: TimerHandle) -> bool {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entry(handle);
        entry.project(inner.now_ns).enabled
    }

    /// Configuration snapshot; `value` and `enabled` are projected to now.
    pub fn params(&self, handle: TimerHandle) -> TimerParams {
        let inner = self.inner.lock().unwrap();
        let entry = inner.entry(handle);
        let projected = entry.project(inner.now_ns);
        let mut params = entry.to_params();
        params.value = projected.value;
        params.enabled = projected.enabled;
        params
    }

    /// Atomically applies `f` to the entry's scheduling parameters. The entry
    /// is synchronized first, so `f` sees the current value; the deadline is
    /// recomputed once afterwards, so a combined limit+divider change can
    /// never produce a spurious intermediate firing.
    pub fn exchange<R>(
        &self,
        handle: TimerHandle,
        f: impl FnOnce(&mut TimerParams) -> R,
    ) -> Result<R, TimerError> {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now_ns;
        let entry = inner.entry_mut(handle);
        entry.sync(now);

        let mut params = entry.to_params();
        let result = f(&mut params);
        validate(&params, matches!(entry.target, Target::Compare { .. }))?;

        if params.value != entry.base_value {
            entry.base_value = params.value;
            entry.residue = 0;
        }
        if params.frequency_hz != entry.frequency_hz || params.divider != entry.divider {
            entry.residue = 0;
        }
        entry.frequency_hz = params.frequency_hz;
        entry.divider = params.divider;
        entry.direction = params.direction;
        entry.mode = params.mode;
        entry.limit = params.limit;
        entry.enabled = params.enabled;
        entry.event_enabled = params.event_enabled;
        entry.deadline_ns = entry.next_deadline(now);
        Ok(result)
    }

    /// Rewrites the current reading, discarding sub-tick progress.
    pub fn set_value(&self, handle: TimerHandle, value: u64) {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now_ns;
        let entry = inner.entry_mut(handle);
        entry.sync(now);
        entry.base_value = value;
        entry.residue = 0;
        entry.deadline_ns = entry.next_deadline(now);
    }

    /// Enables or disables an entry. Enabling arms one wake-up at the next
    /// crossing; disabling cancels the pending wake-up and freezes the value.
    pub fn set_enabled(&self, handle: TimerHandle, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now_ns;
        let entry = inner.entry_mut(handle);
        entry.sync(now);
        entry.enabled = enabled;
        entry.deadline_ns = entry.next_deadline(now);
    }

    /// Rewrites a compare entry's target and re-arms it, even if the target
    /// is unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the entry is not a compare entry.
    pub fn set_compare(&self, handle: TimerHandle, compare: u64) {
        let mut inner = self.inner.lock().unwrap();
        let now = inner.now_ns;
        let entry = inner.entry_mut(handle);
        entry.sync(now);
        match &mut entry.target {
            Target::Compare { compare: c, armed } => {
                *c = compare;
                *armed = true;
            }
            Target::Limit => panic!("set_compare on a limit-target entry"),
        }
        entry.deadline_ns = entry.next_deadline(now);
    }

    /// Drains the entry's undelivered crossing events.
    pub fn take_events(&self, handle: TimerHandle) -> Vec<TimerEvent> {
        let mut inner = self.inner.lock().unwrap();
        std::mem::take(&mut inner.entry_mut(handle).pending)
    }

    /// Discards the entry's undelivered crossing events (used by owners whose
    /// protocol lets a reconfiguration suppress a same-instant crossing).
    pub fn clear_events(&self, handle: TimerHandle) {
        let mut inner = self.inner.lock().unwrap();
        inner.entry_mut(handle).pending.clear();
    }

    /// Earliest pending deadline across all entries, if any. The machine's
    /// time loop may use this to advance in large batches.
    pub fn nearest_deadline(&self) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        inner
            .slots
            .iter()
            .filter_map(|slot| slot.entry.as_ref())
            .filter(|entry| entry.enabled)
            .filter_map(|entry| entry.deadline_ns)
            .min()
    }
}
