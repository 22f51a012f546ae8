//! # Programmable Interrupt Controller (8259 PIC)
//!
//! Drives the legacy pair of cascaded 8259 controllers.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐
//! │   PIC 1     │◀────│   PIC 2     │
//! │  (Master)   │IRQ2 │  (Slave)    │
//! │ IRQ 0-7     │     │ IRQ 8-15    │
//! └──────┬──────┘     └─────────────┘
//!        ▼
//!       CPU
//! ```
//!
//! ## Vector Remapping
//!
//! Out of reset both controllers deliver on vectors that collide with CPU
//! exceptions. [`Pic::remap`] moves them:
//! - PIC 1: vectors 32-39 (IRQ 0-7)
//! - PIC 2: vectors 40-47 (IRQ 8-15)
//!
//! ## Interrupt Assignments
//!
//! | IRQ | Vector | Device    |
//! |-----|--------|-----------|
//! | 0   | 32     | Timer     |
//! | 1   | 33     | Keyboard  |
//! | 2   | 34     | Cascade   |
//!
//! The ICW sequence itself is delegated to [`PicBackend`]; on hardware that is
//! `pic8259::ChainedPics`.

use pic8259::ChainedPics;

use crate::error::SetupError;
use crate::interrupts::vectors::{FIRST_EXTERNAL, SOFTWARE_TEST};

pub const PIC_1_OFFSET: u8 = 32;
pub const PIC_2_OFFSET: u8 = 40;

const LINES_PER_CHIP: u8 = 8;

/// One of the sixteen legacy IRQ lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IrqLine(u8);

impl IrqLine {
    pub const TIMER: IrqLine = IrqLine(0);
    pub const KEYBOARD: IrqLine = IrqLine(1);
    pub const CASCADE: IrqLine = IrqLine(2);

    pub const fn new(line: u8) -> Option<Self> {
        if line < 2 * LINES_PER_CHIP {
            Some(IrqLine(line))
        } else {
            None
        }
    }

    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_slave(self) -> bool {
        self.0 >= LINES_PER_CHIP
    }

    /// (controller index, bit in that controller's mask register)
    #[inline]
    pub const fn mask_position(self) -> (usize, u8) {
        ((self.0 / LINES_PER_CHIP) as usize, 1 << (self.0 % LINES_PER_CHIP))
    }
}

/// Vector bases for the two controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PicOffsets {
    pub master: u8,
    pub slave: u8,
}

impl PicOffsets {
    pub const DEFAULT: PicOffsets = PicOffsets::new(PIC_1_OFFSET, PIC_2_OFFSET);

    pub const fn new(master: u8, slave: u8) -> Self {
        Self { master, slave }
    }

    pub const fn vector_for(self, line: IrqLine) -> u8 {
        if line.is_slave() {
            self.slave + (line.0 - LINES_PER_CHIP)
        } else {
            self.master + line.0
        }
    }

    pub fn line_for(self, vector: u8) -> Option<IrqLine> {
        if (self.master..self.master.saturating_add(LINES_PER_CHIP)).contains(&vector) {
            Some(IrqLine(vector - self.master))
        } else if (self.slave..self.slave.saturating_add(LINES_PER_CHIP)).contains(&vector) {
            Some(IrqLine(vector - self.slave + LINES_PER_CHIP))
        } else {
            None
        }
    }

    /// Both ranges must sit above the exception vectors, be 8-aligned (the
    /// 8259 ignores the low three bits of ICW2), stay apart from each other
    /// and from the software-test vector.
    pub fn validate(self) -> Result<(), SetupError> {
        for offset in [self.master, self.slave] {
            if offset < FIRST_EXTERNAL {
                return Err(SetupError::PicOffsetInExceptionRange { offset });
            }
            if offset % LINES_PER_CHIP != 0 {
                return Err(SetupError::PicOffsetMisaligned { offset });
            }
            // 8-aligned and >= 32 means the range always ends at or below 256.
            if (offset..=offset + (LINES_PER_CHIP - 1)).contains(&SOFTWARE_TEST) {
                return Err(SetupError::PicRangeCollides {
                    offset,
                    vector: SOFTWARE_TEST,
                });
            }
        }
        if self.master == self.slave {
            return Err(SetupError::PicOffsetsOverlap {
                master: self.master,
                slave: self.slave,
            });
        }
        Ok(())
    }
}

/// Hardware side of the controller pair.
pub trait PicBackend {
    /// Run ICW1..ICW4 on both chips with the given bases, leaving the
    /// interrupt masks as they were before.
    unsafe fn initialize(&mut self, offsets: PicOffsets);
    unsafe fn read_masks(&mut self) -> [u8; 2];
    unsafe fn write_masks(&mut self, masks: [u8; 2]);
    /// Acknowledge `line` (slave first when it is a slave line).
    unsafe fn end_of_interrupt(&mut self, line: IrqLine, offsets: PicOffsets);
}

/// The real 8259 pair, through `pic8259`.
pub struct LegacyPics {
    chips: ChainedPics,
}

impl LegacyPics {
    pub const fn new() -> Self {
        Self {
            chips: unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) },
        }
    }
}

impl PicBackend for LegacyPics {
    unsafe fn initialize(&mut self, offsets: PicOffsets) {
        unsafe {
            self.chips = ChainedPics::new(offsets.master, offsets.slave);
            self.chips.initialize();
        }
    }

    unsafe fn read_masks(&mut self) -> [u8; 2] {
        unsafe { self.chips.read_masks() }
    }

    unsafe fn write_masks(&mut self, masks: [u8; 2]) {
        unsafe { self.chips.write_masks(masks[0], masks[1]) }
    }

    unsafe fn end_of_interrupt(&mut self, line: IrqLine, offsets: PicOffsets) {
        unsafe { self.chips.notify_end_of_interrupt(offsets.vector_for(line)) }
    }
}

/// Mask bookkeeping and vector translation on top of a [`PicBackend`].
pub struct Pic<B: PicBackend> {
    backend: B,
    offsets: Option<PicOffsets>,
}

impl<B: PicBackend> Pic<B> {
    pub const fn new(backend: B) -> Self {
        Self {
            backend,
            offsets: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn offsets(&self) -> Option<PicOffsets> {
        self.offsets
    }

    /// Move both controllers to `offsets`, preserving the current masks.
    ///
    /// Must run with interrupts disabled and before the IDT gates for these
    /// vectors can be reached.
    pub fn remap(&mut self, offsets: PicOffsets) -> Result<(), SetupError> {
        offsets.validate()?;
        unsafe { self.backend.initialize(offsets) };
        self.offsets = Some(offsets);
        log::info!(
            "PIC: remapped master={:#x} slave={:#x}",
            offsets.master,
            offsets.slave
        );
        Ok(())
    }

    pub fn masks(&mut self) -> [u8; 2] {
        unsafe { self.backend.read_masks() }
    }

    pub fn set_masks(&mut self, masks: [u8; 2]) {
        unsafe { self.backend.write_masks(masks) }
    }

    pub fn mask(&mut self, line: IrqLine) {
        let (chip, bit) = line.mask_position();
        let mut masks = self.masks();
        masks[chip] |= bit;
        self.set_masks(masks);
    }

    /// Unmasking a slave line also opens the master's cascade input, or the
    /// slave could never reach the CPU.
    pub fn unmask(&mut self, line: IrqLine) {
        let (chip, bit) = line.mask_position();
        let mut masks = self.masks();
        masks[chip] &= !bit;
        if line.is_slave() {
            let (cascade_chip, cascade_bit) = IrqLine::CASCADE.mask_position();
            masks[cascade_chip] &= !cascade_bit;
        }
        self.set_masks(masks);
    }

    pub fn mask_all(&mut self) {
        self.set_masks([0xFF, 0xFF]);
    }

    /// Whether `line` is blocked, including a slave line behind a masked
    /// cascade.
    pub fn is_masked(&mut self, line: IrqLine) -> bool {
        let masks = self.masks();
        let (chip, bit) = line.mask_position();
        if masks[chip] & bit != 0 {
            return true;
        }
        if line.is_slave() {
            let (cascade_chip, cascade_bit) = IrqLine::CASCADE.mask_position();
            return masks[cascade_chip] & cascade_bit != 0;
        }
        false
    }

    pub fn end_of_interrupt(&mut self, line: IrqLine) {
        if let Some(offsets) = self.offsets {
            unsafe { self.backend.end_of_interrupt(line, offsets) };
        }
    }

    pub fn line_for_vector(&self, vector: u8) -> Option<IrqLine> {
        self.offsets.and_then(|offsets| offsets.line_for(vector))
    }

    pub fn vector_for_line(&self, line: IrqLine) -> Option<u8> {
        self.offsets.map(|offsets| offsets.vector_for(line))
    }
}
