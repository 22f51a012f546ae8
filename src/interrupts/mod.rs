//! # Interrupt System
//!
//! Bring-up order, all with interrupts disabled:
//!
//! 1. [`create_core`]: the single [`KernelCore`] (display, PIC, ports)
//! 2. [`gdt::init`]: kernel segments and the double-fault stack
//! 3. [`load_idt`]: 256 trampoline gates, validated, loaded, read back
//! 4. [`remap_pic`]: IRQs 0-15 moved above the exception vectors
//! 5. [`start_timer`] and [`unmask_lines`]
//!
//! Only then may the caller set IF.

pub mod frame;
pub mod gdt;
pub mod handlers;
pub mod idt;
pub mod pic;
pub mod timer;
pub mod trampolines;
pub mod vectors;

use core::fmt;

use spin::{Mutex, Once};

use crate::config::KernelConfig;
use crate::cpu;
use crate::drivers::port::HardwarePorts;
use crate::drivers::ps2_keyboard::{KeyEvent, KeyEventQueue};
use crate::drivers::vga::{CellBuffer, ColorCode, Console, VgaTextBuffer, VGA_TEXT_BASE};
use crate::error::SetupError;

use self::handlers::{InterruptCore, KernelCore};
use self::idt::InterruptDescriptorTable;
use self::pic::{IrqLine, LegacyPics, Pic, PicOffsets};
use self::timer::TICKS;
use self::vectors::standard_bindings;

static CORE: Once<Mutex<KernelCore>> = Once::new();
static IDT: Once<InterruptDescriptorTable> = Once::new();

/// Decoded keys, filled by IRQ1 and drained by the main loop.
pub static KEY_EVENTS: KeyEventQueue = KeyEventQueue::new();

pub fn create_core(config: &KernelConfig) -> Result<(), SetupError> {
    if CORE.is_completed() {
        return Err(SetupError::CoreInitialized);
    }
    CORE.call_once(|| {
        Mutex::new(InterruptCore::new(
            HardwarePorts,
            Pic::new(LegacyPics::new()),
            unsafe { VgaTextBuffer::new(VGA_TEXT_BASE) },
            &TICKS,
            &KEY_EVENTS,
            config,
        ))
    });
    Ok(())
}

/// Lock the core from main-line code. Interrupts stay off for the duration,
/// so no handler can find the lock taken.
pub fn with_core<R>(f: impl FnOnce(&mut KernelCore) -> R) -> Result<R, SetupError> {
    cpu::without_interrupts(|| {
        let core = CORE.get().ok_or(SetupError::CoreMissing)?;
        let mut guard = core.lock();
        Ok(f(&mut guard))
    })
}

/// Build the resident IDT for `offsets` and hand it to the CPU.
pub fn load_idt(code_selector: u16, offsets: PicOffsets) -> Result<(), SetupError> {
    let idt = IDT.call_once(|| {
        InterruptDescriptorTable::populate(
            code_selector,
            trampolines::entry_address,
            &standard_bindings(offsets),
        )
    });
    idt.activate()
}

pub fn remap_pic(offsets: PicOffsets) -> Result<(), SetupError> {
    with_core(|core| {
        core.pic_mut().mask_all();
        core.pic_mut().remap(offsets)
    })?
}

pub fn start_timer(hz: u32) -> Result<(), SetupError> {
    with_core(|core| timer::program(core.ports_mut(), hz))?
}

pub fn unmask_lines(lines: &[IrqLine]) -> Result<(), SetupError> {
    with_core(|core| {
        for &line in lines {
            core.pic_mut().unmask(line);
        }
        let [master, slave] = core.pic_mut().masks();
        log::info!("PIC: masks master={:#010b} slave={:#010b}", master, slave);
    })
}

/// One line on the display. Silently dropped before the core exists.
pub fn print_line(args: fmt::Arguments<'_>) {
    let _ = with_core(|core| core.console_mut().print_line(args));
}

/// Last-resort output for the panic and fatal paths: never waits for a lock
/// that may already be held by the code that failed. Failures from before
/// the core exists go straight to the text buffer.
pub fn try_print_error(args: fmt::Arguments<'_>) {
    cpu::without_interrupts(|| match CORE.get() {
        Some(core) => {
            if let Some(mut core) = core.try_lock() {
                core.console_mut()
                    .print_line_colored(ColorCode::ERROR, args);
            }
        }
        None => {
            print_error_on_bare_screen(unsafe { VgaTextBuffer::new(VGA_TEXT_BASE) }, args);
        }
    });
}

/// Clear a screen no console owns yet and put one error line at the top.
pub fn print_error_on_bare_screen<B: CellBuffer>(
    screen: B,
    args: fmt::Arguments<'_>,
) -> Console<B> {
    let mut console = Console::new(screen);
    console.clear();
    console.print_line_colored(ColorCode::ERROR, args);
    console
}

pub fn next_key_event() -> Option<KeyEvent> {
    KEY_EVENTS.pop()
}

pub fn ticks() -> u64 {
    TICKS.ticks()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::vga::{ScreenCell, BUFFER_WIDTH};
    use crate::testing::MemoryScreen;

    #[test]
    fn setup_error_without_core_reaches_the_screen() {
        let mut screen = MemoryScreen::new();
        for col in 0..BUFFER_WIDTH {
            screen.write_cell(
                0,
                col,
                ScreenCell {
                    ascii: b'#',
                    color: ColorCode::DEFAULT,
                },
            );
        }
        let error = SetupError::PicOffsetsOverlap {
            master: 0x20,
            slave: 0x24,
        };

        let console = print_error_on_bare_screen(screen, format_args!("FATAL: {}", error));

        assert_eq!(
            console.buffer().row_text(0).trim_end(),
            "FATAL: PIC ranges overlap (master 0x20, slave 0x24)"
        );
        assert_eq!(console.buffer().read_cell(0, 0).color, ColorCode::ERROR);
        assert_eq!(console.buffer().read_cell(0, BUFFER_WIDTH - 1), ScreenCell::BLANK);
        assert_eq!(console.cursor(), (1, 0));
    }
}
