//! Compile-time kernel settings. There is no filesystem to load these from,
//! so [`KernelConfig::DEFAULT`] is what boots.

use log::LevelFilter;

use crate::error::SetupError;
use crate::interrupts::pic::{IrqLine, PicOffsets};
use crate::interrupts::timer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    pub pic_offsets: PicOffsets,
    pub timer_hz: u32,
    /// Print `tick N` every this many timer interrupts.
    pub tick_report_interval: u64,
    /// Lines opened once setup finishes; everything else stays masked.
    pub unmasked_lines: &'static [IrqLine],
    /// Fire the software-test and breakpoint vectors after enabling interrupts.
    pub self_test: bool,
    pub log_level: LevelFilter,
}

impl KernelConfig {
    pub const DEFAULT: KernelConfig = KernelConfig {
        pic_offsets: PicOffsets::DEFAULT,
        timer_hz: timer::DEFAULT_HZ,
        tick_report_interval: 100,
        unmasked_lines: &[IrqLine::TIMER, IrqLine::KEYBOARD],
        self_test: true,
        log_level: LevelFilter::Info,
    };

    pub fn validate(&self) -> Result<(), SetupError> {
        self.pic_offsets.validate()?;
        timer::divisor_for(self.timer_hz)?;
        if self.tick_report_interval == 0 {
            return Err(SetupError::ZeroTickInterval);
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
