//! # Interrupt Dispatch
//!
//! [`InterruptCore`] owns every piece of mutable state a handler can touch:
//! the display, the PIC, the port space, the keyboard decoder. The
//! trampoline locks it once per interrupt and calls
//! [`InterruptCore::dispatch`], which looks the vector up in the
//! [`VectorMap`], runs the handler, and acknowledges the PIC.
//!
//! Handlers never unwind or return errors. They answer with a
//! [`Disposition`]: resume the interrupted code, or stop the machine.

use core::fmt::{self, Write};

use x86_64::structures::idt::PageFaultErrorCode;

use crate::config::KernelConfig;
use crate::drivers::port::{HardwarePorts, PortIo, KEYBOARD_DATA};
use crate::drivers::ps2_keyboard::{Key, KeyEvent, KeyEventQueue, ScancodeDecoder};
use crate::drivers::vga::{CellBuffer, ColorCode, Console, VgaTextBuffer};
use crate::interrupts::frame::TrapFrame;
use crate::interrupts::pic::{LegacyPics, Pic, PicBackend};
use crate::interrupts::timer::TickCounter;
use crate::interrupts::vectors::{
    exception_name, standard_bindings, HandlerKind, VectorMap, SOFTWARE_TEST, VECTOR_COUNT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Resume,
    Halt,
}

/// Per-vector dispatch counters.
pub struct InterruptStats {
    counts: [u64; VECTOR_COUNT],
}

impl InterruptStats {
    pub const fn new() -> Self {
        Self {
            counts: [0; VECTOR_COUNT],
        }
    }

    #[inline]
    fn record(&mut self, vector: u8) {
        self.counts[vector as usize] += 1;
    }

    pub fn count(&self, vector: u8) -> u64 {
        self.counts[vector as usize]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

impl Default for InterruptStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded page-fault error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFaultCause(PageFaultErrorCode);

impl PageFaultCause {
    pub fn new(error_code: u64) -> Self {
        Self(PageFaultErrorCode::from_bits_truncate(error_code))
    }
}

impl fmt::Display for PageFaultCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence = if self.0.contains(PageFaultErrorCode::PROTECTION_VIOLATION) {
            "protection"
        } else {
            "not-present"
        };
        let access = if self.0.contains(PageFaultErrorCode::INSTRUCTION_FETCH) {
            "fetch"
        } else if self.0.contains(PageFaultErrorCode::CAUSED_BY_WRITE) {
            "write"
        } else {
            "read"
        };
        let mode = if self.0.contains(PageFaultErrorCode::USER_MODE) {
            "user"
        } else {
            "kernel"
        };
        write!(f, "{} {} {}", presence, access, mode)
    }
}

/// Decoded selector error code (GPF, segment-not-present and friends).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorErrorCode(u64);

impl SelectorErrorCode {
    pub fn new(error_code: u64) -> Self {
        Self(error_code)
    }

    pub fn external(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn table(self) -> &'static str {
        match (self.0 >> 1) & 0b11 {
            0b00 => "GDT",
            0b10 => "LDT",
            _ => "IDT",
        }
    }

    pub fn index(self) -> u64 {
        (self.0 & 0xFFFF) >> 3
    }
}

impl fmt::Display for SelectorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.table(), self.index())?;
        if self.external() {
            f.write_str(" external")?;
        }
        Ok(())
    }
}

pub struct InterruptCore<P: PortIo, C: PicBackend, S: CellBuffer> {
    console: Console<S>,
    pic: Pic<C>,
    ports: P,
    ticks: &'static TickCounter,
    keys: &'static KeyEventQueue,
    decoder: ScancodeDecoder,
    vectors: VectorMap,
    stats: InterruptStats,
    tick_report_interval: u64,
}

/// The instance the trampolines dispatch into on real hardware.
pub type KernelCore = InterruptCore<HardwarePorts, LegacyPics, VgaTextBuffer>;

impl<P: PortIo, C: PicBackend, S: CellBuffer> InterruptCore<P, C, S> {
    /// Bind the standard vectors for `config`'s PIC offsets. The PIC itself is
    /// left untouched until [`Pic::remap`] runs.
    pub fn new(
        ports: P,
        pic: Pic<C>,
        screen: S,
        ticks: &'static TickCounter,
        keys: &'static KeyEventQueue,
        config: &KernelConfig,
    ) -> Self {
        let mut console = Console::new(screen);
        console.clear();
        Self {
            console,
            pic,
            ports,
            ticks,
            keys,
            decoder: ScancodeDecoder::new(),
            vectors: VectorMap::from_bindings(&standard_bindings(config.pic_offsets)),
            stats: InterruptStats::new(),
            tick_report_interval: config.tick_report_interval.max(1),
        }
    }

    pub fn console(&self) -> &Console<S> {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut Console<S> {
        &mut self.console
    }

    pub fn pic(&self) -> &Pic<C> {
        &self.pic
    }

    pub fn pic_mut(&mut self) -> &mut Pic<C> {
        &mut self.pic
    }

    pub fn ports_mut(&mut self) -> &mut P {
        &mut self.ports
    }

    pub fn stats(&self) -> &InterruptStats {
        &self.stats
    }

    pub fn vectors(&self) -> &VectorMap {
        &self.vectors
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.ticks()
    }

    /// Run the handler bound to `frame`'s vector.
    ///
    /// `fault_address` is CR2 as read on entry; it only means something for
    /// page faults. Handlers that resume get their PIC line acknowledged
    /// before this returns.
    pub fn dispatch(&mut self, frame: &mut TrapFrame, fault_address: u64) -> Disposition {
        let vector = frame.vector();
        self.stats.record(vector);

        let disposition = match self.vectors.kind(vector) {
            HandlerKind::SoftwareTest => self.software_test(frame),
            HandlerKind::Timer => self.timer(),
            HandlerKind::Keyboard => self.keyboard(),
            HandlerKind::Breakpoint => self.breakpoint(frame),
            HandlerKind::PageFault => self.page_fault(frame, fault_address),
            HandlerKind::GeneralProtection => self.general_protection(frame),
            HandlerKind::DoubleFault => self.double_fault(frame),
            HandlerKind::Unhandled => self.unhandled(frame),
        };

        if disposition == Disposition::Resume {
            if let Some(line) = self.pic.line_for_vector(vector) {
                self.pic.end_of_interrupt(line);
            }
        }
        disposition
    }

    fn software_test(&mut self, frame: &TrapFrame) -> Disposition {
        self.console.print_line(format_args!(
            "software interrupt {:#x} received",
            SOFTWARE_TEST
        ));
        log::debug!("software interrupt from rip={:#x}", frame.rip);
        Disposition::Resume
    }

    fn timer(&mut self) -> Disposition {
        let ticks = self.ticks.increment();
        if ticks % self.tick_report_interval == 0 {
            self.console.print_line(format_args!("tick {}", ticks));
        }
        Disposition::Resume
    }

    fn keyboard(&mut self) -> Disposition {
        let scancode = unsafe { self.ports.read_u8(KEYBOARD_DATA) };
        if let Some(event) = self.decoder.process_scancode(scancode) {
            self.echo(&event);
            if !self.keys.push(event) {
                log::warn!("key queue full, dropped {:?}", event.key);
            }
        }
        Disposition::Resume
    }

    fn echo(&mut self, event: &KeyEvent) {
        match event.key {
            Key::Char('\t') => self.console.write_byte(b' '),
            Key::Char(c) if c.is_ascii() => self.console.write_byte(c as u8),
            _ => {}
        }
    }

    fn breakpoint(&mut self, frame: &TrapFrame) -> Disposition {
        self.console
            .print_line(format_args!("breakpoint at {:#x}", frame.rip));
        log::info!("breakpoint at {:#x}", frame.rip);
        Disposition::Resume
    }

    fn page_fault(&mut self, frame: &TrapFrame, fault_address: u64) -> Disposition {
        let cause = PageFaultCause::new(frame.error_code());
        self.fatal(
            frame,
            format_args!(
                "PAGE FAULT at {:#x} err={:#x} ({}) rip={:#x}",
                fault_address,
                frame.error_code(),
                cause,
                frame.rip
            ),
        )
    }

    fn general_protection(&mut self, frame: &TrapFrame) -> Disposition {
        let err = frame.error_code();
        if err == 0 {
            self.fatal(
                frame,
                format_args!("GENERAL PROTECTION err=0 rip={:#x}", frame.rip),
            )
        } else {
            self.fatal(
                frame,
                format_args!(
                    "GENERAL PROTECTION err={:#x} selector {} rip={:#x}",
                    err,
                    SelectorErrorCode::new(err),
                    frame.rip
                ),
            )
        }
    }

    fn double_fault(&mut self, frame: &TrapFrame) -> Disposition {
        self.fatal(
            frame,
            format_args!("DOUBLE FAULT rip={:#x} rsp={:#x}", frame.rip, frame.rsp),
        )
    }

    fn unhandled(&mut self, frame: &TrapFrame) -> Disposition {
        let vector = frame.vector();
        let mut origin = LineBuf::new();
        if let Some(name) = exception_name(vector) {
            let _ = write!(origin, " ({})", name);
        } else if let Some(line) = self.pic.line_for_vector(vector) {
            let _ = write!(origin, " (IRQ {})", line.number());
        }
        self.fatal(
            frame,
            format_args!(
                "unhandled interrupt {}{} err={:#x} rip={:#x}",
                vector,
                origin.as_str(),
                frame.error_code(),
                frame.rip
            ),
        )
    }

    fn fatal(&mut self, frame: &TrapFrame, report: fmt::Arguments<'_>) -> Disposition {
        self.console.print_line_colored(ColorCode::ERROR, report);
        log::error!("{}", report);
        frame.dump();
        Disposition::Halt
    }
}

/// Small fixed buffer for composing a line fragment without a heap.
struct LineBuf {
    bytes: [u8; 48],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self {
            bytes: [0; 48],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = self.bytes.len() - self.len;
        let take = s.len().min(room);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupts::pic::{IrqLine, PicOffsets};
    use crate::interrupts::vectors::{BREAKPOINT, GENERAL_PROTECTION, PAGE_FAULT};
    use crate::testing::SimMachine;

    /// Dispatch-level only: the handler leaves the frame it was given alone.
    /// Register save/restore in the trampolines is checked by the frame
    /// layout asserts and `common_path_saves_and_restores_symmetrically`.
    #[test]
    fn software_interrupt_prints_once_and_preserves_frame() {
        let mut machine = SimMachine::booted();
        let before = machine.core.console().lines_printed();
        let original = TrapFrame {
            rax: 0x1111,
            rbx: 0x2222,
            rcx: 0x3333,
            rdx: 0x4444,
            rsi: 0x5555,
            rdi: 0x6666,
            rbp: 0x7777,
            r8: 8,
            r9: 9,
            r10: 10,
            r11: 11,
            r12: 12,
            r13: 13,
            r14: 14,
            r15: 15,
            vector: SOFTWARE_TEST as u64,
            rip: 0xdead_beef,
            cs: 0x08,
            rflags: 0x202,
            rsp: 0x9000,
            ss: 0x10,
            ..TrapFrame::default()
        };
        let mut frame = original;
        let disposition = machine.core.dispatch(&mut frame, 0);

        assert_eq!(disposition, Disposition::Resume);
        assert_eq!(machine.core.console().lines_printed() - before, 1);
        assert_eq!(frame.as_bytes(), original.as_bytes());
        assert!(machine.screen_contains("software interrupt 0x80 received"));
        // Not a PIC vector, so nothing to acknowledge.
        assert_eq!(machine.core.pic().backend().master_eois, 0);
    }

    #[test]
    fn remapped_lines_reach_their_vectors() {
        let mut machine = SimMachine::booted();
        machine.core.pic_mut().unmask(IrqLine::TIMER);
        machine.core.pic_mut().unmask(IrqLine::KEYBOARD);

        assert_eq!(machine.pulse(IrqLine::TIMER), Some(Disposition::Resume));
        machine.ports().push_scancode(0x1E);
        assert_eq!(machine.pulse(IrqLine::KEYBOARD), Some(Disposition::Resume));

        assert_eq!(machine.core.stats().count(32), 1);
        assert_eq!(machine.core.stats().count(33), 1);
        assert_eq!(machine.core.stats().total(), 2);
        assert_eq!(machine.core.pic().backend().master_eois, 2);
    }

    #[test]
    fn masked_line_is_not_delivered_until_unmasked() {
        let mut machine = SimMachine::booted();
        machine.core.pic_mut().mask_all();

        assert_eq!(machine.pulse(IrqLine::KEYBOARD), None);
        assert_eq!(machine.core.stats().count(33), 0);

        machine.core.pic_mut().unmask(IrqLine::KEYBOARD);
        machine.ports().push_scancode(0x1E);
        assert_eq!(machine.pulse(IrqLine::KEYBOARD), Some(Disposition::Resume));
        assert_eq!(machine.core.stats().count(33), 1);
    }

    #[test]
    fn hundred_ticks_with_keyboard_masked() {
        let mut machine = SimMachine::booted();
        machine.core.pic_mut().unmask(IrqLine::TIMER);
        machine.core.pic_mut().mask(IrqLine::KEYBOARD);
        let start = machine.core.ticks();

        for _ in 0..100 {
            machine.pulse(IrqLine::TIMER);
            machine.pulse(IrqLine::KEYBOARD);
        }

        assert_eq!(machine.core.ticks() - start, 100);
        assert_eq!(machine.core.stats().count(33), 0);
        assert!(machine.screen_contains("tick 100"));
    }

    #[test]
    fn page_fault_reports_address_and_halts() {
        let mut machine = SimMachine::booted();
        // Write to a not-present page from kernel mode.
        let disposition = machine.fault(PAGE_FAULT, 0b010, 0xdead_b000);

        assert_eq!(disposition, Disposition::Halt);
        assert!(machine.screen_contains("0xdeadb000"));
        assert!(machine.screen_contains("not-present write kernel"));
    }

    #[test]
    fn general_protection_decodes_selector() {
        let mut machine = SimMachine::booted();
        // Index 3 in the GDT.
        let disposition = machine.fault(GENERAL_PROTECTION, 3 << 3, 0);
        assert_eq!(disposition, Disposition::Halt);
        assert!(machine.screen_contains("selector GDT[3]"));
    }

    #[test]
    fn breakpoint_resumes() {
        let mut machine = SimMachine::booted();
        assert_eq!(machine.software(BREAKPOINT), Disposition::Resume);
        assert!(machine.screen_contains("breakpoint at"));
    }

    #[test]
    fn unhandled_vectors_name_their_origin() {
        let mut machine = SimMachine::booted();
        assert_eq!(machine.software(0), Disposition::Halt);
        assert!(machine.screen_contains("unhandled interrupt 0 (Divide Error)"));

        machine.core.pic_mut().unmask(IrqLine::new(5).unwrap());
        assert_eq!(machine.pulse(IrqLine::new(5).unwrap()), Some(Disposition::Halt));
        assert!(machine.screen_contains("unhandled interrupt 37 (IRQ 5)"));

        assert_eq!(machine.software(200), Disposition::Halt);
        assert!(machine.screen_contains("unhandled interrupt 200 err=0x0"));
    }

    #[test]
    fn keyboard_echoes_and_queues() {
        let mut machine = SimMachine::booted();
        machine.core.pic_mut().unmask(IrqLine::KEYBOARD);
        for code in [0x23, 0x17, 0x0E, 0x17, 0x1C] {
            machine.ports().push_scancode(code);
            machine.pulse(IrqLine::KEYBOARD);
        }
        // Arrow keys are queued but not echoed.
        machine.ports().push_scancode(0xE0);
        machine.pulse(IrqLine::KEYBOARD);
        machine.ports().push_scancode(0x48);
        machine.pulse(IrqLine::KEYBOARD);

        assert!(machine.screen_contains("hi"));
        let mut chars = [None; 6];
        for slot in chars.iter_mut() {
            *slot = machine.keys.pop().map(|event| event.key);
        }
        assert_eq!(
            chars,
            [
                Some(Key::Char('h')),
                Some(Key::Char('i')),
                Some(Key::Char('\x08')),
                Some(Key::Char('i')),
                Some(Key::Char('\n')),
                Some(Key::Arrow(crate::drivers::ps2_keyboard::Arrow::Up)),
            ]
        );
        assert!(machine.keys.is_empty());
    }

    #[test]
    fn custom_offsets_move_timer_vector() {
        let config = KernelConfig {
            pic_offsets: PicOffsets::new(0x50, 0x58),
            ..KernelConfig::DEFAULT
        };
        let mut machine = SimMachine::with_config(&config);
        machine.core.pic_mut().unmask(IrqLine::TIMER);
        assert_eq!(machine.pulse(IrqLine::TIMER), Some(Disposition::Resume));
        assert_eq!(machine.core.stats().count(0x50), 1);
        assert_eq!(machine.core.stats().count(32), 0);
    }

    #[test]
    fn page_fault_cause_strings() {
        assert_eq!(
            PageFaultCause::new(0b00001).to_string(),
            "protection read kernel"
        );
        assert_eq!(
            PageFaultCause::new(0b10100).to_string(),
            "not-present fetch user"
        );
    }

    #[test]
    fn selector_error_code_tables() {
        let code = SelectorErrorCode::new((5 << 3) | 0b010 | 1);
        assert_eq!(code.table(), "IDT");
        assert_eq!(code.index(), 5);
        assert!(code.external());
        assert_eq!(SelectorErrorCode::new(0b100).table(), "LDT");
    }
}
