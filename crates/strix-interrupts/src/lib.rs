#![forbid(unsafe_code)]

mod line;
mod reducer;

pub use line::{IrqEvent, IrqLine, IrqProbe, NoIrq};
pub use reducer::compute_irq;
