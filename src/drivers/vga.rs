//! # VGA Text Console
//!
//! The display sink every handler reports through. The hardware renders an
//! 80x25 grid of cells straight out of physical memory at `0xB8000`; each cell
//! is an ASCII byte followed by an attribute byte.
//!
//! ```text
//!  offset = (row * 80 + col) * 2
//!  ┌────────┬──────────────────────┐
//!  │ ascii  │ bg (4 bits) fg (4)   │
//!  └────────┴──────────────────────┘
//! ```
//!
//! [`Console`] owns the cursor and the scrolling policy; the cell storage is
//! behind [`CellBuffer`] so tests can render into memory.

use core::fmt;

use crate::drivers::port::{HardwarePorts, PortIo, VGA_CRTC_INDEX};

pub const BUFFER_WIDTH: usize = 80;
pub const BUFFER_HEIGHT: usize = 25;
pub const VGA_TEXT_BASE: usize = 0xB8000;

const CRTC_CURSOR_HIGH: u16 = 0x0E;
const CRTC_CURSOR_LOW: u16 = 0x0F;
const REPLACEMENT_GLYPH: u8 = 0xFE;
const BACKSPACE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Blue = 1,
    Green = 2,
    Cyan = 3,
    Red = 4,
    Magenta = 5,
    Brown = 6,
    LightGray = 7,
    DarkGray = 8,
    LightBlue = 9,
    LightGreen = 10,
    LightCyan = 11,
    LightRed = 12,
    Pink = 13,
    Yellow = 14,
    White = 15,
}

/// Attribute byte: background in the high nibble, foreground in the low one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    pub const DEFAULT: ColorCode = ColorCode::new(Color::LightGray, Color::Black);
    pub const ERROR: ColorCode = ColorCode::new(Color::White, Color::Red);

    pub const fn new(foreground: Color, background: Color) -> Self {
        ColorCode((background as u8) << 4 | (foreground as u8))
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenCell {
    pub ascii: u8,
    pub color: ColorCode,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ScreenCell>(), 2);

impl ScreenCell {
    pub const BLANK: ScreenCell = ScreenCell {
        ascii: b' ',
        color: ColorCode::DEFAULT,
    };
}

/// Storage for the character grid.
pub trait CellBuffer {
    fn write_cell(&mut self, row: usize, col: usize, cell: ScreenCell);
    fn read_cell(&self, row: usize, col: usize) -> ScreenCell;

    /// Move the visible cursor. Buffers without one ignore this.
    fn move_cursor(&mut self, _row: usize, _col: usize) {}
}

/// The memory-mapped VGA text buffer.
pub struct VgaTextBuffer {
    base: *mut ScreenCell,
    ports: HardwarePorts,
}

// The buffer is only reachable through the kernel core's mutex.
unsafe impl Send for VgaTextBuffer {}

impl VgaTextBuffer {
    /// # Safety
    ///
    /// `base` must be the identity-mapped VGA text window (or another
    /// writable region of at least 80x25 cells) for the kernel's lifetime.
    pub const unsafe fn new(base: usize) -> Self {
        Self {
            base: base as *mut ScreenCell,
            ports: HardwarePorts,
        }
    }

    fn cell_ptr(&self, row: usize, col: usize) -> Option<*mut ScreenCell> {
        if row < BUFFER_HEIGHT && col < BUFFER_WIDTH {
            Some(self.base.wrapping_add(row * BUFFER_WIDTH + col))
        } else {
            None
        }
    }
}

impl CellBuffer for VgaTextBuffer {
    fn write_cell(&mut self, row: usize, col: usize, cell: ScreenCell) {
        if let Some(ptr) = self.cell_ptr(row, col) {
            unsafe { core::ptr::write_volatile(ptr, cell) };
        }
    }

    fn read_cell(&self, row: usize, col: usize) -> ScreenCell {
        match self.cell_ptr(row, col) {
            Some(ptr) => unsafe { core::ptr::read_volatile(ptr) },
            None => ScreenCell::BLANK,
        }
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        let pos = (row * BUFFER_WIDTH + col) as u16;
        // A word write to the CRTC index port sets index (low) and data (high).
        unsafe {
            self.ports
                .write_u16(VGA_CRTC_INDEX, CRTC_CURSOR_LOW | (pos & 0xFF) << 8);
            self.ports
                .write_u16(VGA_CRTC_INDEX, CRTC_CURSOR_HIGH | (pos >> 8) << 8);
        }
    }
}

/// Cursor-tracking writer over a [`CellBuffer`].
pub struct Console<B: CellBuffer> {
    buffer: B,
    row: usize,
    col: usize,
    color: ColorCode,
    /// Text attribute for the line being printed, if not `color`.
    ink: Option<ColorCode>,
    lines_printed: u64,
}

impl<B: CellBuffer> Console<B> {
    pub const fn new(buffer: B) -> Self {
        Self {
            buffer,
            row: 0,
            col: 0,
            color: ColorCode::DEFAULT,
            ink: None,
            lines_printed: 0,
        }
    }

    pub fn clear(&mut self) {
        for row in 0..BUFFER_HEIGHT {
            self.clear_row(row);
        }
        self.row = 0;
        self.col = 0;
        self.sync_cursor();
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    pub fn color(&self) -> ColorCode {
        self.color
    }

    pub fn set_color(&mut self, color: ColorCode) {
        self.color = color;
    }

    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Number of complete lines emitted through [`Console::print_line`].
    pub fn lines_printed(&self) -> u64 {
        self.lines_printed
    }

    pub fn write_byte(&mut self, byte: u8) {
        match byte {
            b'\n' => self.new_line(),
            b'\r' => self.col = 0,
            BACKSPACE => self.backspace(),
            0x20..=0x7E => self.put(byte),
            _ => self.put(REPLACEMENT_GLYPH),
        }
        self.sync_cursor();
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.write_byte(byte);
        }
    }

    /// Write one full line. Starts on a fresh line if the cursor is mid-row.
    pub fn print_line(&mut self, args: fmt::Arguments<'_>) {
        if self.col != 0 {
            self.new_line();
        }
        let _ = fmt::Write::write_fmt(self, args);
        self.new_line();
        self.sync_cursor();
        self.lines_printed += 1;
    }

    /// [`Console::print_line`] in a different attribute. Only the text takes
    /// it: rows blanked by a scroll keep the console colour.
    pub fn print_line_colored(&mut self, color: ColorCode, args: fmt::Arguments<'_>) {
        let previous = self.ink.replace(color);
        self.print_line(args);
        self.ink = previous;
    }

    fn put(&mut self, byte: u8) {
        if self.col >= BUFFER_WIDTH {
            self.new_line();
        }
        self.buffer.write_cell(
            self.row,
            self.col,
            ScreenCell {
                ascii: byte,
                color: self.ink.unwrap_or(self.color),
            },
        );
        self.col += 1;
    }

    fn backspace(&mut self) {
        if self.col > 0 {
            self.col -= 1;
            self.buffer.write_cell(self.row, self.col, self.blank());
        }
    }

    fn new_line(&mut self) {
        self.col = 0;
        if self.row + 1 < BUFFER_HEIGHT {
            self.row += 1;
        } else {
            self.scroll_up();
        }
    }

    fn scroll_up(&mut self) {
        for row in 1..BUFFER_HEIGHT {
            for col in 0..BUFFER_WIDTH {
                let cell = self.buffer.read_cell(row, col);
                self.buffer.write_cell(row - 1, col, cell);
            }
        }
        self.clear_row(BUFFER_HEIGHT - 1);
        self.row = BUFFER_HEIGHT - 1;
    }

    fn clear_row(&mut self, row: usize) {
        let blank = self.blank();
        for col in 0..BUFFER_WIDTH {
            self.buffer.write_cell(row, col, blank);
        }
    }

    fn blank(&self) -> ScreenCell {
        ScreenCell {
            ascii: b' ',
            color: self.color,
        }
    }

    fn sync_cursor(&mut self) {
        let col = self.col.min(BUFFER_WIDTH - 1);
        self.buffer.move_cursor(self.row, col);
    }
}

impl<B: CellBuffer> fmt::Write for Console<B> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryScreen;

    fn console() -> Console<MemoryScreen> {
        Console::new(MemoryScreen::new())
    }

    #[test]
    fn color_code_packs_background_high() {
        let code = ColorCode::new(Color::Yellow, Color::Blue);
        assert_eq!(code.bits(), 0x1E);
        assert_eq!(ColorCode::DEFAULT.bits(), 0x07);
    }

    #[test]
    fn writes_advance_cursor() {
        let mut console = console();
        console.write_bytes(b"hi");
        assert_eq!(console.cursor(), (0, 2));
        assert_eq!(console.buffer().row_text(0).trim_end(), "hi");
        assert_eq!(console.buffer().read_cell(0, 0).color, ColorCode::DEFAULT);
    }

    #[test]
    fn long_line_wraps() {
        let mut console = console();
        for _ in 0..BUFFER_WIDTH + 3 {
            console.write_byte(b'x');
        }
        assert_eq!(console.cursor(), (1, 3));
    }

    #[test]
    fn overflow_scrolls_and_clears_last_row() {
        let mut console = console();
        for i in 0..BUFFER_HEIGHT + 1 {
            console.print_line(format_args!("line {}", i));
        }
        assert_eq!(console.buffer().row_text(0).trim_end(), "line 2");
        assert_eq!(
            console.buffer().row_text(BUFFER_HEIGHT - 2).trim_end(),
            "line 25"
        );
        assert!(console.buffer().row_text(BUFFER_HEIGHT - 1).trim().is_empty());
        assert_eq!(console.cursor(), (BUFFER_HEIGHT - 1, 0));
        assert!(console.buffer().out_of_bounds_writes() == 0);
    }

    #[test]
    fn backspace_erases_previous_cell() {
        let mut console = console();
        console.write_bytes(b"ab\x08");
        assert_eq!(console.cursor(), (0, 1));
        assert_eq!(console.buffer().row_text(0).trim_end(), "a");
    }

    #[test]
    fn non_printable_is_replaced() {
        let mut console = console();
        console.write_byte(0x01);
        assert_eq!(console.buffer().read_cell(0, 0).ascii, REPLACEMENT_GLYPH);
    }

    #[test]
    fn print_line_counts_once_and_starts_fresh_row() {
        let mut console = console();
        console.write_bytes(b"partial");
        console.print_line(format_args!("{} {}", "two", "parts"));
        assert_eq!(console.lines_printed(), 1);
        assert_eq!(console.buffer().row_text(1).trim_end(), "two parts");
        assert_eq!(console.cursor(), (2, 0));
    }

    #[test]
    fn colored_line_restores_color() {
        let mut console = console();
        console.print_line_colored(ColorCode::ERROR, format_args!("bad"));
        assert_eq!(console.buffer().read_cell(0, 0).color, ColorCode::ERROR);
        assert_eq!(console.color(), ColorCode::DEFAULT);
    }

    #[test]
    fn colored_line_scroll_blanks_in_console_color() {
        let mut console = console();
        for i in 0..BUFFER_HEIGHT {
            console.print_line(format_args!("line {}", i));
        }
        console.print_line_colored(ColorCode::ERROR, format_args!("FATAL"));

        let fatal_row = BUFFER_HEIGHT - 2;
        assert_eq!(console.buffer().row_text(fatal_row).trim_end(), "FATAL");
        assert_eq!(console.buffer().read_cell(fatal_row, 0).color, ColorCode::ERROR);
        for col in 0..BUFFER_WIDTH {
            assert_eq!(
                console.buffer().read_cell(BUFFER_HEIGHT - 1, col),
                ScreenCell::BLANK
            );
        }
    }

    #[test]
    fn cursor_follows_writes() {
        let mut console = console();
        console.write_bytes(b"abc\n");
        assert_eq!(console.buffer().cursor(), (1, 0));
    }
}
