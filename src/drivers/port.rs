//! # Port I/O
//!
//! Byte and word access to the x86 I/O port space.
//!
//! Everything that talks to legacy hardware (PIT, keyboard controller, VGA
//! CRTC) goes through [`PortIo`], so the interrupt path can run against
//! [`HardwarePorts`] on the machine and against a simulated bus in tests.
//!
//! ## Port Map
//!
//! | Port        | Device                         |
//! |-------------|--------------------------------|
//! | 0x20 / 0x21 | Master 8259 command / data     |
//! | 0xA0 / 0xA1 | Slave 8259 command / data      |
//! | 0x40 / 0x43 | PIT channel 0 data / command   |
//! | 0x60        | PS/2 keyboard data             |
//! | 0x80        | POST diagnostic (used as delay)|
//! | 0x3D4       | VGA CRTC index (+0x3D5 data)   |

use x86_64::instructions::port::Port;

pub const PIC1_COMMAND: u16 = 0x20;
pub const PIC1_DATA: u16 = 0x21;
pub const PIC2_COMMAND: u16 = 0xA0;
pub const PIC2_DATA: u16 = 0xA1;
pub const PIT_CHANNEL0: u16 = 0x40;
pub const PIT_COMMAND: u16 = 0x43;
pub const KEYBOARD_DATA: u16 = 0x60;
pub const POST_DELAY: u16 = 0x80;
pub const VGA_CRTC_INDEX: u16 = 0x3D4;

/// Raw access to the I/O port space.
///
/// All methods are unsafe: a port write can reprogram hardware that the rest
/// of the kernel relies on, and some port reads have side effects (reading
/// 0x60 consumes the pending scancode).
pub trait PortIo {
    unsafe fn read_u8(&mut self, port: u16) -> u8;
    unsafe fn write_u8(&mut self, port: u16, value: u8);
    unsafe fn read_u16(&mut self, port: u16) -> u16;
    unsafe fn write_u16(&mut self, port: u16, value: u16);

    /// Give slow ISA devices time to settle between writes.
    unsafe fn io_wait(&mut self) {
        unsafe { self.write_u8(POST_DELAY, 0) };
    }
}

/// The machine's real port space.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwarePorts;

impl PortIo for HardwarePorts {
    #[inline]
    unsafe fn read_u8(&mut self, port: u16) -> u8 {
        unsafe { Port::<u8>::new(port).read() }
    }

    #[inline]
    unsafe fn write_u8(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }

    #[inline]
    unsafe fn read_u16(&mut self, port: u16) -> u16 {
        unsafe { Port::<u16>::new(port).read() }
    }

    #[inline]
    unsafe fn write_u16(&mut self, port: u16, value: u16) {
        unsafe { Port::<u16>::new(port).write(value) }
    }
}
