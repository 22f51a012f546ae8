//! Host-side stand-ins for the hardware behind the driver traits.

use std::boxed::Box;
use std::collections::VecDeque;
use std::string::String;
use std::vec::Vec;

use crate::config::KernelConfig;
use crate::drivers::port::{PortIo, KEYBOARD_DATA};
use crate::drivers::ps2_keyboard::KeyEventQueue;
use crate::drivers::vga::{CellBuffer, ScreenCell, BUFFER_HEIGHT, BUFFER_WIDTH};
use crate::interrupts::frame::TrapFrame;
use crate::interrupts::handlers::{Disposition, InterruptCore};
use crate::interrupts::pic::{IrqLine, Pic, PicBackend, PicOffsets};
use crate::interrupts::timer::TickCounter;

/// Port space that records writes and serves queued scancodes on 0x60.
#[derive(Default)]
pub struct SimPorts {
    byte_writes: Vec<(u16, u8)>,
    word_writes: Vec<(u16, u16)>,
    scancodes: VecDeque<u8>,
}

impl SimPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn byte_writes(&self) -> &[(u16, u8)] {
        &self.byte_writes
    }

    pub fn word_writes(&self) -> &[(u16, u16)] {
        &self.word_writes
    }

    pub fn push_scancode(&mut self, scancode: u8) {
        self.scancodes.push_back(scancode);
    }
}

impl PortIo for SimPorts {
    unsafe fn read_u8(&mut self, port: u16) -> u8 {
        match port {
            KEYBOARD_DATA => self.scancodes.pop_front().unwrap_or(0),
            _ => 0xFF,
        }
    }

    unsafe fn write_u8(&mut self, port: u16, value: u8) {
        self.byte_writes.push((port, value));
    }

    unsafe fn read_u16(&mut self, _port: u16) -> u16 {
        0xFFFF
    }

    unsafe fn write_u16(&mut self, port: u16, value: u16) {
        self.word_writes.push((port, value));
    }
}

/// Controller pair that keeps its state in plain fields.
pub struct SimPics {
    pub masks: [u8; 2],
    pub offsets: Option<PicOffsets>,
    pub initializations: usize,
    pub master_eois: usize,
    pub slave_eois: usize,
}

impl SimPics {
    /// Power-on state: everything masked, no vectors assigned.
    pub fn new() -> Self {
        Self {
            masks: [0xFF, 0xFF],
            offsets: None,
            initializations: 0,
            master_eois: 0,
            slave_eois: 0,
        }
    }
}

impl PicBackend for SimPics {
    unsafe fn initialize(&mut self, offsets: PicOffsets) {
        self.offsets = Some(offsets);
        self.initializations += 1;
    }

    unsafe fn read_masks(&mut self) -> [u8; 2] {
        self.masks
    }

    unsafe fn write_masks(&mut self, masks: [u8; 2]) {
        self.masks = masks;
    }

    unsafe fn end_of_interrupt(&mut self, line: IrqLine, _offsets: PicOffsets) {
        if line.is_slave() {
            self.slave_eois += 1;
        }
        self.master_eois += 1;
    }
}

/// 80x25 cells in memory.
pub struct MemoryScreen {
    cells: Vec<ScreenCell>,
    cursor: (usize, usize),
    out_of_bounds: usize,
}

impl MemoryScreen {
    pub fn new() -> Self {
        Self {
            cells: vec![ScreenCell::BLANK; BUFFER_WIDTH * BUFFER_HEIGHT],
            cursor: (0, 0),
            out_of_bounds: 0,
        }
    }

    pub fn row_text(&self, row: usize) -> String {
        self.cells[row * BUFFER_WIDTH..(row + 1) * BUFFER_WIDTH]
            .iter()
            .map(|cell| cell.ascii as char)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        (0..BUFFER_HEIGHT).any(|row| self.row_text(row).contains(needle))
    }

    pub fn out_of_bounds_writes(&self) -> usize {
        self.out_of_bounds
    }

    pub fn cursor(&self) -> (usize, usize) {
        self.cursor
    }
}

impl CellBuffer for MemoryScreen {
    fn write_cell(&mut self, row: usize, col: usize, cell: ScreenCell) {
        if row < BUFFER_HEIGHT && col < BUFFER_WIDTH {
            self.cells[row * BUFFER_WIDTH + col] = cell;
        } else {
            self.out_of_bounds += 1;
        }
    }

    fn read_cell(&self, row: usize, col: usize) -> ScreenCell {
        if row < BUFFER_HEIGHT && col < BUFFER_WIDTH {
            self.cells[row * BUFFER_WIDTH + col]
        } else {
            ScreenCell::BLANK
        }
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        self.cursor = (row, col);
    }
}

pub type SimCore = InterruptCore<SimPorts, SimPics, MemoryScreen>;

/// A core wired to simulated hardware. Lines are raised through the PIC
/// masks the way the 8259 would gate them.
pub struct SimMachine {
    pub core: SimCore,
    pub keys: &'static KeyEventQueue,
}

impl SimMachine {
    pub fn with_config(config: &KernelConfig) -> Self {
        let ticks: &'static TickCounter = Box::leak(Box::new(TickCounter::new()));
        let keys: &'static KeyEventQueue = Box::leak(Box::new(KeyEventQueue::new()));
        let mut core = InterruptCore::new(
            SimPorts::new(),
            Pic::new(SimPics::new()),
            MemoryScreen::new(),
            ticks,
            keys,
            config,
        );
        core.pic_mut()
            .remap(config.pic_offsets)
            .expect("valid test offsets");
        Self { core, keys }
    }

    /// Default configuration, PIC remapped, every line masked.
    pub fn booted() -> Self {
        Self::with_config(&KernelConfig::DEFAULT)
    }

    pub fn ports(&mut self) -> &mut SimPorts {
        self.core.ports_mut()
    }

    pub fn screen_contains(&self, needle: &str) -> bool {
        self.core.console().buffer().contains(needle)
    }

    /// Raise `line`. Returns `None` if the PIC mask swallowed it.
    pub fn pulse(&mut self, line: IrqLine) -> Option<Disposition> {
        if self.core.pic_mut().is_masked(line) {
            return None;
        }
        let vector = self.core.pic().vector_for_line(line)?;
        let mut frame = frame_for(vector, 0);
        Some(self.core.dispatch(&mut frame, 0))
    }

    /// `int n` with no error code.
    pub fn software(&mut self, vector: u8) -> Disposition {
        let mut frame = frame_for(vector, 0);
        self.core.dispatch(&mut frame, 0)
    }

    pub fn fault(&mut self, vector: u8, error_code: u64, fault_address: u64) -> Disposition {
        let mut frame = frame_for(vector, error_code);
        self.core.dispatch(&mut frame, fault_address)
    }
}

fn frame_for(vector: u8, error_code: u64) -> TrapFrame {
    TrapFrame {
        vector: vector as u64,
        error_code,
        cs: 0x08,
        ss: 0x10,
        rflags: 0x202,
        ..TrapFrame::default()
    }
}
