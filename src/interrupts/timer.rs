//! # Programmable Interval Timer
//!
//! Channel 0 of the 8253/8254 drives IRQ0. It is programmed as a rate
//! generator (mode 2) with a 16-bit divisor of the 1.193182 MHz input clock.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::drivers::port::{PortIo, PIT_CHANNEL0, PIT_COMMAND};
use crate::error::SetupError;

pub const PIT_FREQUENCY: u32 = 1_193_182;
pub const DEFAULT_HZ: u32 = 100;

/// Channel 0, lobyte/hibyte access, mode 2, binary.
const CHANNEL0_RATE_GENERATOR: u8 = 0x34;

pub fn divisor_for(hz: u32) -> Result<u16, SetupError> {
    if hz == 0 {
        return Err(SetupError::TimerFrequencyOutOfRange { hz });
    }
    match PIT_FREQUENCY / hz {
        divisor @ 1..=0xFFFF => Ok(divisor as u16),
        _ => Err(SetupError::TimerFrequencyOutOfRange { hz }),
    }
}

/// Start channel 0 firing at `hz`.
pub fn program<P: PortIo>(ports: &mut P, hz: u32) -> Result<(), SetupError> {
    let divisor = divisor_for(hz)?;
    let [lo, hi] = divisor.to_le_bytes();
    unsafe {
        ports.write_u8(PIT_COMMAND, CHANNEL0_RATE_GENERATOR);
        ports.write_u8(PIT_CHANNEL0, lo);
        ports.write_u8(PIT_CHANNEL0, hi);
    }
    log::info!("PIT: {} Hz (divisor {})", hz, divisor);
    Ok(())
}

/// Timer interrupts since boot.
pub struct TickCounter(AtomicU64);

impl TickCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Called from the timer handler only. Returns the new count.
    #[inline]
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn uptime_ms(&self, hz: u32) -> u64 {
        if hz == 0 {
            return 0;
        }
        self.ticks() * 1000 / hz as u64
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

pub static TICKS: TickCounter = TickCounter::new();

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SimPorts;

    #[test]
    fn divisor_bounds() {
        assert_eq!(divisor_for(100), Ok(11931));
        assert_eq!(divisor_for(PIT_FREQUENCY), Ok(1));
        assert_eq!(divisor_for(19), Ok(62799));
        assert!(divisor_for(18).is_err());
        assert!(divisor_for(0).is_err());
        assert!(divisor_for(PIT_FREQUENCY + 1).is_err());
    }

    #[test]
    fn program_writes_command_then_lo_hi() {
        let mut ports = SimPorts::new();
        program(&mut ports, 100).unwrap();
        let [lo, hi] = 11931u16.to_le_bytes();
        assert_eq!(
            ports.byte_writes(),
            &[(PIT_COMMAND, 0x34), (PIT_CHANNEL0, lo), (PIT_CHANNEL0, hi)]
        );
    }

    #[test]
    fn bad_frequency_leaves_pit_alone() {
        let mut ports = SimPorts::new();
        assert!(program(&mut ports, 1).is_err());
        assert!(ports.byte_writes().is_empty());
    }

    #[test]
    fn uptime_follows_ticks() {
        let counter = TickCounter::new();
        for _ in 0..250 {
            counter.increment();
        }
        assert_eq!(counter.ticks(), 250);
        assert_eq!(counter.uptime_ms(100), 2500);
        assert_eq!(counter.uptime_ms(0), 0);
    }
}
