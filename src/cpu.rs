//! Thin wrappers over the privileged instructions the kernel needs.

use x86_64::instructions::{self, interrupts};
use x86_64::registers::control::Cr2;
use x86_64::registers::segmentation::{Segment, CS};

use crate::interrupts::vectors::SOFTWARE_TEST;

/// Stop for good: mask interrupts, then `hlt` forever (NMIs can still wake
/// the core, hence the loop).
pub fn halt_forever() -> ! {
    loop {
        interrupts::disable();
        instructions::hlt();
    }
}

/// Sleep until the next interrupt.
#[inline]
pub fn wait_for_interrupt() {
    instructions::hlt();
}

#[inline]
pub fn interrupts_enabled() -> bool {
    interrupts::are_enabled()
}

#[inline]
pub fn disable_interrupts() {
    interrupts::disable();
}

#[inline]
pub fn enable_interrupts() {
    interrupts::enable();
}

/// Run `f` with IF cleared, restoring the previous state afterwards.
#[inline]
pub fn without_interrupts<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    interrupts::without_interrupts(f)
}

/// CR2: linear address of the most recent page fault.
#[inline]
pub fn fault_address() -> u64 {
    Cr2::read_raw()
}

#[inline]
pub fn code_selector() -> u16 {
    CS::get_reg().0
}

/// Fire the software-test vector.
pub fn raise_software_test() {
    unsafe { interrupts::software_interrupt::<SOFTWARE_TEST>() };
}

pub fn raise_breakpoint() {
    interrupts::int3();
}
