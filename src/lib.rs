//! Interrupt-handling core for a small x86_64 kernel.
//!
//! The `kernel` binary boots this library; everything that touches hardware
//! sits behind [`drivers::port::PortIo`], [`interrupts::pic::PicBackend`] and
//! [`drivers::vga::CellBuffer`], so the dispatch path also runs on the host
//! under `cargo test`.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod config;
pub mod cpu;
pub mod drivers;
pub mod error;
pub mod interrupts;
pub mod kernel;
pub mod logger;

#[cfg(test)]
pub mod testing;

/// Print one line to the VGA console from main-line code.
#[macro_export]
macro_rules! kprintln {
    ($($arg:tt)*) => {
        $crate::interrupts::print_line(format_args!($($arg)*))
    };
}
