//! # Interrupt Descriptor Table
//!
//! 256 gate descriptors, 16 bytes each, read by the CPU on every interrupt.
//!
//! ## Gate Descriptor Layout
//!
//! ```text
//!  byte  0..2   offset bits 0..16
//!  byte  2..4   code segment selector
//!  byte  4      IST index (bits 0..3), rest zero
//!  byte  5      attributes: P(7) DPL(6:5) 0(4) type(3:0)
//!  byte  6..8   offset bits 16..32
//!  byte  8..12  offset bits 32..64
//!  byte 12..16  reserved, zero
//! ```
//!
//! The table is filled once before interrupts are enabled and then loaded
//! from a `&'static` reference: the CPU keeps dereferencing it, so it must
//! never move or be freed.

use core::mem::{offset_of, size_of};

use static_assertions::const_assert_eq;
use x86_64::instructions::tables;
use x86_64::structures::DescriptorTablePointer;
use x86_64::{PrivilegeLevel, VirtAddr};

use crate::error::SetupError;
use crate::interrupts::vectors::{VectorBinding, VECTOR_COUNT};

const PRESENT: u8 = 1 << 7;
const DPL_SHIFT: u8 = 5;
const MAX_IST: u8 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GateKind {
    /// Clears IF on entry.
    Interrupt = 0xE,
    /// Leaves IF untouched on entry.
    Trap = 0xF,
}

/// The attribute byte of a gate descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct GateAttributes(u8);

impl GateAttributes {
    pub const INTERRUPT: GateAttributes = GateAttributes::new(GateKind::Interrupt, PrivilegeLevel::Ring0);
    pub const TRAP: GateAttributes = GateAttributes::new(GateKind::Trap, PrivilegeLevel::Ring0);

    pub const fn new(kind: GateKind, dpl: PrivilegeLevel) -> Self {
        GateAttributes(PRESENT | ((dpl as u8) << DPL_SHIFT) | kind as u8)
    }

    pub const fn for_kind(kind: GateKind) -> Self {
        match kind {
            GateKind::Interrupt => Self::INTERRUPT,
            GateKind::Trap => Self::TRAP,
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_present(self) -> bool {
        self.0 & PRESENT != 0
    }

    pub fn privilege_level(self) -> PrivilegeLevel {
        PrivilegeLevel::from_u16(((self.0 >> DPL_SHIFT) & 0b11) as u16)
    }

    pub fn kind(self) -> Option<GateKind> {
        match self.0 & 0xF {
            0xE => Some(GateKind::Interrupt),
            0xF => Some(GateKind::Trap),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct GateDescriptor {
    offset_low: u16,
    selector: u16,
    ist: u8,
    attributes: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

const_assert_eq!(size_of::<GateDescriptor>(), 16);
const_assert_eq!(offset_of!(GateDescriptor, selector), 2);
const_assert_eq!(offset_of!(GateDescriptor, ist), 4);
const_assert_eq!(offset_of!(GateDescriptor, attributes), 5);
const_assert_eq!(offset_of!(GateDescriptor, offset_mid), 6);
const_assert_eq!(offset_of!(GateDescriptor, offset_high), 8);
const_assert_eq!(offset_of!(GateDescriptor, reserved), 12);

impl GateDescriptor {
    /// A non-present descriptor. Any interrupt through it faults.
    pub const MISSING: GateDescriptor = GateDescriptor {
        offset_low: 0,
        selector: 0,
        ist: 0,
        attributes: 0,
        offset_mid: 0,
        offset_high: 0,
        reserved: 0,
    };

    pub const fn new(address: u64, selector: u16, attributes: GateAttributes) -> Self {
        GateDescriptor {
            offset_low: address as u16,
            selector,
            ist: 0,
            attributes: attributes.bits(),
            offset_mid: (address >> 16) as u16,
            offset_high: (address >> 32) as u32,
            reserved: 0,
        }
    }

    /// Reassemble the handler address from its three fields.
    pub const fn address(&self) -> u64 {
        self.offset_low as u64 | (self.offset_mid as u64) << 16 | (self.offset_high as u64) << 32
    }

    pub const fn selector(&self) -> u16 {
        self.selector
    }

    pub const fn attributes(&self) -> GateAttributes {
        GateAttributes(self.attributes)
    }

    pub const fn stack_index(&self) -> u8 {
        self.ist
    }

    pub const fn is_present(&self) -> bool {
        self.attributes().is_present()
    }
}

pub const IDT_LIMIT: u16 = (VECTOR_COUNT * size_of::<GateDescriptor>() - 1) as u16;

#[repr(C, align(16))]
pub struct InterruptDescriptorTable {
    entries: [GateDescriptor; VECTOR_COUNT],
    selector: u16,
}

impl InterruptDescriptorTable {
    /// An empty table whose gates will use `code_selector`.
    pub const fn new(code_selector: u16) -> Self {
        Self {
            entries: [GateDescriptor::MISSING; VECTOR_COUNT],
            selector: code_selector,
        }
    }

    /// Every vector through its own trampoline, then the bindings on top.
    ///
    /// `entry` gives the trampoline address for a vector.
    pub fn populate(
        code_selector: u16,
        entry: impl Fn(u8) -> u64,
        bindings: &[VectorBinding],
    ) -> Self {
        let mut idt = Self::new(code_selector);
        for vector in 0..=u8::MAX {
            idt.install(vector, entry(vector), GateAttributes::INTERRUPT);
        }
        for binding in bindings {
            idt.install(
                binding.vector,
                entry(binding.vector),
                GateAttributes::for_kind(binding.gate),
            );
            if let Some(ist) = binding.stack {
                idt.set_stack_index(binding.vector, ist);
            }
        }
        idt
    }

    pub fn install(&mut self, vector: u8, handler_address: u64, attributes: GateAttributes) {
        self.entries[vector as usize] = GateDescriptor::new(handler_address, self.selector, attributes);
    }

    /// Run `vector` on IST slot `ist` (1..=7); 0 keeps the current stack.
    pub fn set_stack_index(&mut self, vector: u8, ist: u8) {
        self.entries[vector as usize].ist = ist;
    }

    #[inline]
    pub fn entry(&self, vector: u8) -> &GateDescriptor {
        &self.entries[vector as usize]
    }

    pub fn selector(&self) -> u16 {
        self.selector
    }

    /// Consistency check run before the table is handed to the CPU.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.selector & !0b11 == 0 {
            return Err(SetupError::NullCodeSelector);
        }
        for (vector, entry) in self.entries.iter().enumerate() {
            let vector = vector as u8;
            if !entry.is_present() || entry.address() == 0 {
                return Err(SetupError::MissingDescriptor { vector });
            }
            if entry.selector() != self.selector
                || entry.stack_index() > MAX_IST
                || entry.attributes().kind().is_none()
                || entry.reserved != 0
            {
                return Err(SetupError::MalformedDescriptor { vector });
            }
        }
        Ok(())
    }

    pub fn pointer(&self) -> DescriptorTablePointer {
        DescriptorTablePointer {
            limit: IDT_LIMIT,
            base: VirtAddr::from_ptr(self.entries.as_ptr()),
        }
    }

    /// Validate, load IDTR, and read it back.
    ///
    /// There is no way back: from here on every interrupt goes through this
    /// table.
    pub fn activate(&'static self) -> Result<(), SetupError> {
        self.validate()?;
        let pointer = self.pointer();
        unsafe { tables::lidt(&pointer) };

        check_readback(&pointer, &tables::sidt())?;
        let (base, limit) = ({ pointer.base }, { pointer.limit });
        log::debug!("IDT: loaded base={:#x} limit={:#x}", base.as_u64(), limit);
        Ok(())
    }
}

/// Compare what `sidt` returned with what was handed to `lidt`.
///
/// The pointer is packed, so fields are copied out before use.
pub fn check_readback(
    expected: &DescriptorTablePointer,
    loaded: &DescriptorTablePointer,
) -> Result<(), SetupError> {
    let (expected_base, expected_limit) = ({ expected.base }, { expected.limit });
    let (loaded_base, loaded_limit) = ({ loaded.base }, { loaded.limit });
    if loaded_base != expected_base || loaded_limit != expected_limit {
        return Err(SetupError::IdtReadbackMismatch {
            expected: expected_base.as_u64(),
            loaded: loaded_base.as_u64(),
        });
    }
    Ok(())
}
