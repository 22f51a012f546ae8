//! # Vector Assignments
//!
//! | Vector | Source                  | Handler kind        | Gate      |
//! |--------|-------------------------|---------------------|-----------|
//! | 3      | `int3`                  | `Breakpoint`        | trap      |
//! | 8      | double fault            | `DoubleFault`       | interrupt, IST1 |
//! | 13     | general protection      | `GeneralProtection` | interrupt |
//! | 14     | page fault              | `PageFault`         | interrupt |
//! | M+0    | IRQ0 (PIT)              | `Timer`             | interrupt |
//! | M+1    | IRQ1 (keyboard)         | `Keyboard`          | interrupt |
//! | 0x80   | `int 0x80`              | `SoftwareTest`      | trap      |
//! | other  | anything                | `Unhandled`         | interrupt |
//!
//! `M` is the master PIC offset (32 by default). The same binding list feeds
//! both the IDT and the dispatch table, so the two cannot disagree.

use crate::interrupts::gdt::DOUBLE_FAULT_IST;
use crate::interrupts::idt::GateKind;
use crate::interrupts::pic::{IrqLine, PicOffsets};

pub const VECTOR_COUNT: usize = 256;

pub const BREAKPOINT: u8 = 3;
pub const DOUBLE_FAULT: u8 = 8;
pub const GENERAL_PROTECTION: u8 = 13;
pub const PAGE_FAULT: u8 = 14;
/// First vector that is not reserved for CPU exceptions.
pub const FIRST_EXTERNAL: u8 = 32;
pub const SOFTWARE_TEST: u8 = 0x80;

/// Exceptions for which the CPU pushes an error code.
pub const fn has_error_code(vector: u8) -> bool {
    matches!(vector, 8 | 10..=14 | 17 | 21 | 29 | 30)
}

pub const fn is_exception(vector: u8) -> bool {
    vector < FIRST_EXTERNAL
}

pub fn exception_name(vector: u8) -> Option<&'static str> {
    let name = match vector {
        0 => "Divide Error",
        1 => "Debug",
        2 => "Non-Maskable Interrupt",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound Range Exceeded",
        6 => "Invalid Opcode",
        7 => "Device Not Available",
        8 => "Double Fault",
        9 => "Coprocessor Segment Overrun",
        10 => "Invalid TSS",
        11 => "Segment Not Present",
        12 => "Stack-Segment Fault",
        13 => "General Protection Fault",
        14 => "Page Fault",
        16 => "x87 Floating-Point Error",
        17 => "Alignment Check",
        18 => "Machine Check",
        19 => "SIMD Floating-Point Exception",
        20 => "Virtualization Exception",
        21 => "Control Protection Exception",
        28 => "Hypervisor Injection Exception",
        29 => "VMM Communication Exception",
        30 => "Security Exception",
        v if v < FIRST_EXTERNAL => "Reserved",
        _ => return None,
    };
    Some(name)
}

/// What a vector does once the trampoline hands it over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Unhandled,
    SoftwareTest,
    Timer,
    Keyboard,
    Breakpoint,
    PageFault,
    GeneralProtection,
    DoubleFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorBinding {
    pub vector: u8,
    pub kind: HandlerKind,
    pub gate: GateKind,
    /// 1-based IST slot, `None` to stay on the current stack.
    pub stack: Option<u8>,
}

impl VectorBinding {
    const fn new(vector: u8, kind: HandlerKind, gate: GateKind) -> Self {
        Self {
            vector,
            kind,
            gate,
            stack: None,
        }
    }

    const fn on_stack(mut self, ist: u8) -> Self {
        self.stack = Some(ist);
        self
    }
}

pub const STANDARD_BINDING_COUNT: usize = 7;

/// The kernel's fixed vector assignments for a given PIC remap.
pub fn standard_bindings(offsets: PicOffsets) -> [VectorBinding; STANDARD_BINDING_COUNT] {
    [
        VectorBinding::new(BREAKPOINT, HandlerKind::Breakpoint, GateKind::Trap),
        VectorBinding::new(DOUBLE_FAULT, HandlerKind::DoubleFault, GateKind::Interrupt)
            .on_stack(DOUBLE_FAULT_IST),
        VectorBinding::new(
            GENERAL_PROTECTION,
            HandlerKind::GeneralProtection,
            GateKind::Interrupt,
        ),
        VectorBinding::new(PAGE_FAULT, HandlerKind::PageFault, GateKind::Interrupt),
        VectorBinding::new(
            offsets.vector_for(IrqLine::TIMER),
            HandlerKind::Timer,
            GateKind::Interrupt,
        ),
        VectorBinding::new(
            offsets.vector_for(IrqLine::KEYBOARD),
            HandlerKind::Keyboard,
            GateKind::Interrupt,
        ),
        VectorBinding::new(SOFTWARE_TEST, HandlerKind::SoftwareTest, GateKind::Trap),
    ]
}

/// Tagged vector -> handler table.
#[derive(Clone)]
pub struct VectorMap {
    kinds: [HandlerKind; VECTOR_COUNT],
}

impl VectorMap {
    /// Every vector reports itself as unhandled.
    pub const fn unhandled() -> Self {
        Self {
            kinds: [HandlerKind::Unhandled; VECTOR_COUNT],
        }
    }

    pub fn from_bindings(bindings: &[VectorBinding]) -> Self {
        let mut map = Self::unhandled();
        for binding in bindings {
            map.kinds[binding.vector as usize] = binding.kind;
        }
        map
    }

    #[inline]
    pub fn kind(&self, vector: u8) -> HandlerKind {
        self.kinds[vector as usize]
    }

    pub fn vector_of(&self, kind: HandlerKind) -> Option<u8> {
        self.kinds
            .iter()
            .position(|k| *k == kind)
            .map(|v| v as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_vectors() {
        let with_code: [u8; 10] = [8, 10, 11, 12, 13, 14, 17, 21, 29, 30];
        for vector in 0..=255u8 {
            assert_eq!(has_error_code(vector), with_code.contains(&vector), "{vector}");
        }
    }

    #[test]
    fn exception_names_stop_at_32() {
        assert_eq!(exception_name(14), Some("Page Fault"));
        assert_eq!(exception_name(15), Some("Reserved"));
        assert_eq!(exception_name(32), None);
    }

    #[test]
    fn default_remap_bindings() {
        let map = VectorMap::from_bindings(&standard_bindings(PicOffsets::DEFAULT));
        assert_eq!(map.kind(32), HandlerKind::Timer);
        assert_eq!(map.kind(33), HandlerKind::Keyboard);
        assert_eq!(map.kind(0x80), HandlerKind::SoftwareTest);
        assert_eq!(map.kind(14), HandlerKind::PageFault);
        assert_eq!(map.kind(13), HandlerKind::GeneralProtection);
        assert_eq!(map.kind(34), HandlerKind::Unhandled);
        assert_eq!(map.kind(0), HandlerKind::Unhandled);
        assert_eq!(map.kind(255), HandlerKind::Unhandled);
    }

    #[test]
    fn bindings_follow_remap() {
        let offsets = PicOffsets::new(0x50, 0x58);
        let map = VectorMap::from_bindings(&standard_bindings(offsets));
        assert_eq!(map.vector_of(HandlerKind::Timer), Some(0x50));
        assert_eq!(map.vector_of(HandlerKind::Keyboard), Some(0x51));
        assert_eq!(map.kind(32), HandlerKind::Unhandled);
    }

    #[test]
    fn software_test_is_a_trap_gate_and_double_fault_switches_stacks() {
        let bindings = standard_bindings(PicOffsets::DEFAULT);
        let test = bindings.iter().find(|b| b.vector == SOFTWARE_TEST).unwrap();
        assert_eq!(test.gate, GateKind::Trap);
        let timer = bindings
            .iter()
            .find(|b| b.kind == HandlerKind::Timer)
            .unwrap();
        assert_eq!(timer.gate, GateKind::Interrupt);
        let df = bindings.iter().find(|b| b.vector == DOUBLE_FAULT).unwrap();
        assert_eq!(df.stack, Some(DOUBLE_FAULT_IST));
    }
}
