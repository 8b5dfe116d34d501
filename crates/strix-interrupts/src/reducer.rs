/// Reduces per-bit interrupt enable/pending masks to the level of the shared
/// output line: asserted while any pending bit is also enabled.
///
/// Register adapters keep their enable and pending bits as plain masks and
/// derive the line level through this one function instead of wiring each bit
/// by hand.
#[must_use]
pub fn compute_irq(enable_mask: u64, pending_mask: u64) -> bool {
    enable_mask & pending_mask != 0
}
