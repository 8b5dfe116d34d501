//! Multi-channel general-purpose countdown timer block.
//!
//! Each channel is a descending countdown with its own reload and control
//! register; all channels share one prescaler and one interrupt line. The
//! line level is reduced from the per-channel interrupt-enable and pending
//! bits.

use strix_interrupts::{compute_irq, IrqLine};
use strix_time::{
    ClockScheduler, Direction, LimitTimer, LimitTimerConfig, TimerError, WorkMode,
};

pub const GPTIMER_MMIO_SIZE: u64 = 0x100;
pub const GPTIMER_MAX_CHANNELS: usize = 8;

const REG_SCALER_RELOAD: u64 = 0x00;
const REG_CONFIG: u64 = 0x04;
const REG_PENDING: u64 = 0x08;

const REG_CHANNEL_BASE: u64 = 0x10;
const CHANNEL_STRIDE: u64 = 0x10;
const REG_CH_VALUE: u64 = 0x0;
const REG_CH_RELOAD: u64 = 0x4;
const REG_CH_CTRL: u64 = 0x8;

const CTRL_ENABLE: u32 = 1 << 0;
/// Restart (periodic) mode; clear for one-shot.
const CTRL_RESTART: u32 = 1 << 1;
/// Load strobe: copies the reload register into the counter. Reads back 0.
const CTRL_LOAD: u32 = 1 << 2;
const CTRL_INT_ENABLE: u32 = 1 << 3;

#[derive(Debug, Clone, Copy)]
pub struct GpTimerConfig {
    pub channels: usize,
    pub frequency_hz: u64,
}

impl Default for GpTimerConfig {
    fn default() -> Self {
        Self {
            channels: 4,
            frequency_hz: 1_000_000,
        }
    }
}

struct Channel {
    timer: LimitTimer,
    reload: u32,
    /// Stored RESTART/INT_ENABLE bits; ENABLE is read live from the timer.
    ctrl: u32,
}

impl Channel {
    fn effective_limit(reload: u32) -> u64 {
        // A zero reload would fire every tick; substitute the minimal
        // nonzero period the way the real adapters do.
        u64::from(reload.max(1))
    }
}

pub struct GpTimer {
    channels: Vec<Channel>,
    scaler_reload: u32,
    pending: u32,
}

impl GpTimer {
    pub fn new(sched: &ClockScheduler, config: GpTimerConfig) -> Result<Self, TimerError> {
        if config.channels == 0 || config.channels > GPTIMER_MAX_CHANNELS {
            return Err(TimerError::InvalidConfiguration(
                "channel count must be between 1 and 8",
            ));
        }
        let mut channels = Vec::with_capacity(config.channels);
        for _ in 0..config.channels {
            channels.push(Channel {
                timer: LimitTimer::new(
                    sched,
                    LimitTimerConfig {
                        frequency_hz: config.frequency_hz,
                        divider: 1,
                        limit: 1,
                        direction: Direction::Descending,
                        mode: WorkMode::OneShot,
                        enabled: false,
                        event_enabled: true,
                    },
                )?,
                reload: 0,
                ctrl: 0,
            });
        }
        Ok(Self {
            channels,
            scaler_reload: 0,
            pending: 0,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Drains channel crossings into the pending register and re-drives the
    /// interrupt line.
    pub fn poll(&mut self, irq: &mut impl IrqLine) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            if !channel.timer.take_events().is_empty() {
                self.pending |= 1 << index;
            }
        }
        self.update_irq(irq);
    }

    fn enable_mask(&self) -> u32 {
        let mut mask = 0;
        for (index, channel) in self.channels.iter().enumerate() {
            if channel.ctrl & CTRL_INT_ENABLE != 0 {
                mask |= 1 << index;
            }
        }
        mask
    }

    fn update_irq(&mut self, irq: &mut impl IrqLine) {
        irq.set_level(compute_irq(
            u64::from(self.enable_mask()),
            u64::from(self.pending),
        ));
    }

    fn channel_reg(offset: u64) -> Option<(usize, u64)> {
        if offset < REG_CHANNEL_BASE {
            return None;
        }
        let index = ((offset - REG_CHANNEL_BASE) / CHANNEL_STRIDE) as usize;
        let reg = (offset - REG_CHANNEL_BASE) % CHANNEL_STRIDE;
        Some((index, reg))
    }

    pub fn mmio_read(&mut self, offset: u64, irq: &mut impl IrqLine) -> u32 {
        self.poll(irq);

        match offset {
            REG_SCALER_RELOAD => self.scaler_reload,
            REG_CONFIG => self.channels.len() as u32,
            REG_PENDING => self.pending,
            _ => match Self::channel_reg(offset) {
                Some((index, reg)) if index < self.channels.len() => {
                    let channel = &self.channels[index];
                    match reg {
                        REG_CH_VALUE => channel.timer.value() as u32,
                        REG_CH_RELOAD => channel.reload,
                        REG_CH_CTRL => {
                            let enable = if channel.timer.is_enabled() {
                                CTRL_ENABLE
                            } else {
                                0
                            };
                            channel.ctrl | enable
                        }
                        _ => 0,
                    }
                }
                _ => 0,
            },
        }
    }

    pub fn mmio_write(&mut self, offset: u64, value: u32, irq: &mut impl IrqLine) {
        self.poll(irq);

        match offset {
            REG_SCALER_RELOAD => {
                self.scaler_reload = value;
                let divider = value.saturating_add(1);
                for channel in &self.channels {
                    channel
                        .timer
                        .set_divider(divider)
                        .expect("nonzero divider");
                }
            }
            REG_CONFIG => {}
            REG_PENDING => {
                self.pending &= !value;
            }
            _ => match Self::channel_reg(offset) {
                Some((index, reg)) if index < self.channels.len() => {
                    let channel = &mut self.channels[index];
                    match reg {
                        REG_CH_VALUE => channel.timer.set_value(u64::from(value)),
                        REG_CH_RELOAD => {
                            channel.reload = value;
                            channel
                                .timer
                                .set_limit_keep_value(Channel::effective_limit(value))
                                .expect("nonzero limit");
                        }
                        REG_CH_CTRL => {
                            channel.ctrl = value & (CTRL_RESTART | CTRL_INT_ENABLE);
                            let mode = if value & CTRL_RESTART != 0 {
                                WorkMode::Periodic
                            } else {
                                WorkMode::OneShot
                            };
                            channel.timer.set_mode(mode);
                            if value & CTRL_LOAD != 0 {
                                channel
                                    .timer
                                    .set_value(Channel::effective_limit(channel.reload));
                            }
                            channel.timer.set_enabled(value & CTRL_ENABLE != 0);
                        }
                        _ => {}
                    }
                }
                _ => {}
            },
        }

        self.update_irq(irq);
    }

    /// Machine reset: all channels stopped and reloaded, prescaler cleared.
    pub fn reset(&mut self, irq: &mut impl IrqLine) {
        for channel in &mut self.channels {
            channel.reload = 0;
            channel.ctrl = 0;
            channel.timer.reset();
            channel.timer.set_limit_and_reload(1).expect("nonzero limit");
            channel.timer.set_divider(1).expect("nonzero divider");
        }
        self.scaler_reload = 0;
        self.pending = 0;
        irq.set_level(false);
    }
}
