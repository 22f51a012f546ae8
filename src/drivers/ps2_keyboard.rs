//! # PS/2 Keyboard
//!
//! Scancode set 1 decoding for the IRQ1 handler.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐  IRQ1   ┌──────────────────┐        ┌───────────────┐
//! │  Keyboard   │────────▶│ ScancodeDecoder  │───────▶│ KeyEventQueue │
//! │  (Port 60)  │         │ - 0xE0 prefix    │        │  (SPSC, 64)   │
//! └─────────────┘         │ - modifiers      │        └───────┬───────┘
//!                         └────────┬─────────┘                │
//!                                  ▼                          ▼
//!                               display                  main loop
//! ```
//!
//! 1. The handler reads one byte from port 0x60
//! 2. `ScancodeDecoder` tracks `0xE0` prefixes and Shift/Ctrl/Alt state;
//!    bit 7 marks a release
//! 3. A decoded `KeyEvent` is echoed to the display and queued for main-line
//!    consumers

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;
const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Arrow(Arrow),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl KeyEvent {
    const EMPTY: KeyEvent = KeyEvent {
        key: Key::Char('\0'),
        ctrl: false,
        alt: false,
        shift: false,
    };

    pub fn character(&self) -> Option<char> {
        match self.key {
            Key::Char(c) => Some(c),
            Key::Arrow(_) => None,
        }
    }
}

pub struct ScancodeDecoder {
    is_extended: bool,
    shift_pressed: bool,
    ctrl_pressed: bool,
    alt_pressed: bool,
}

impl ScancodeDecoder {
    pub const fn new() -> Self {
        Self {
            is_extended: false,
            shift_pressed: false,
            ctrl_pressed: false,
            alt_pressed: false,
        }
    }

    pub fn process_scancode(&mut self, scancode: u8) -> Option<KeyEvent> {
        if scancode == EXTENDED_PREFIX {
            self.is_extended = true;
            return None;
        }

        let is_release = scancode & RELEASE_BIT != 0;
        let key_code = scancode & !RELEASE_BIT;

        if self.is_extended {
            self.is_extended = false;
            return match key_code {
                // Right Ctrl / Right Alt share codes with the left keys.
                0x1D => {
                    self.ctrl_pressed = !is_release;
                    None
                }
                0x38 => {
                    self.alt_pressed = !is_release;
                    None
                }
                _ if is_release => None,
                0x48 => Some(self.event(Key::Arrow(Arrow::Up))),
                0x50 => Some(self.event(Key::Arrow(Arrow::Down))),
                0x4B => Some(self.event(Key::Arrow(Arrow::Left))),
                0x4D => Some(self.event(Key::Arrow(Arrow::Right))),
                _ => None,
            };
        }

        match key_code {
            0x2A | 0x36 => {
                self.shift_pressed = !is_release;
                return None;
            }
            0x1D => {
                self.ctrl_pressed = !is_release;
                return None;
            }
            0x38 => {
                self.alt_pressed = !is_release;
                return None;
            }
            _ => {}
        }

        if is_release {
            return None;
        }

        self.scancode_to_char(key_code)
            .map(|c| self.event(Key::Char(c)))
    }

    fn event(&self, key: Key) -> KeyEvent {
        KeyEvent {
            key,
            ctrl: self.ctrl_pressed,
            alt: self.alt_pressed,
            shift: self.shift_pressed,
        }
    }

    fn scancode_to_char(&self, scancode: u8) -> Option<char> {
        const LETTERS: [(u8, char); 26] = [
            (0x10, 'q'), (0x11, 'w'), (0x12, 'e'), (0x13, 'r'), (0x14, 't'),
            (0x15, 'y'), (0x16, 'u'), (0x17, 'i'), (0x18, 'o'), (0x19, 'p'),
            (0x1E, 'a'), (0x1F, 's'), (0x20, 'd'), (0x21, 'f'), (0x22, 'g'),
            (0x23, 'h'), (0x24, 'j'), (0x25, 'k'), (0x26, 'l'), (0x2C, 'z'),
            (0x2D, 'x'), (0x2E, 'c'), (0x2F, 'v'), (0x30, 'b'), (0x31, 'n'),
            (0x32, 'm'),
        ];

        if let Some(&(_, c)) = LETTERS.iter().find(|(code, _)| *code == scancode) {
            return Some(if self.shift_pressed {
                c.to_ascii_uppercase()
            } else {
                c
            });
        }

        let shifted = self.shift_pressed;
        let pick = |plain: char, upper: char| if shifted { upper } else { plain };

        let ch = match scancode {
            0x02..=0x0B => {
                let digit = if scancode == 0x0B {
                    '0'
                } else {
                    (scancode - 0x02 + b'1') as char
                };
                if shifted {
                    match digit {
                        '1' => '!', '2' => '@', '3' => '#', '4' => '$', '5' => '%',
                        '6' => '^', '7' => '&', '8' => '*', '9' => '(', _ => ')',
                    }
                } else {
                    digit
                }
            }
            0x39 => ' ',
            0x1C => '\n',
            0x0E => '\x08',
            0x0F => '\t',
            0x0C => pick('-', '_'),
            0x0D => pick('=', '+'),
            0x1A => pick('[', '{'),
            0x1B => pick(']', '}'),
            0x27 => pick(';', ':'),
            0x28 => pick('\'', '"'),
            0x29 => pick('`', '~'),
            0x2B => pick('\\', '|'),
            0x33 => pick(',', '<'),
            0x34 => pick('.', '>'),
            0x35 => pick('/', '?'),
            _ => return None,
        };

        Some(ch)
    }
}

/// Lock-free single-producer (keyboard handler) / single-consumer (main
/// loop) ring of decoded key events. One slot is kept free to tell full
/// from empty.
pub struct KeyEventQueue {
    slots: UnsafeCell<[KeyEvent; QUEUE_CAPACITY]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// Sound only with one producer and one consumer, which is how the kernel
// wires it (IRQ1 pushes, main loop pops).
unsafe impl Sync for KeyEventQueue {}

impl KeyEventQueue {
    pub const fn new() -> Self {
        Self {
            slots: UnsafeCell::new([KeyEvent::EMPTY; QUEUE_CAPACITY]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Returns `false` and drops the event when the queue is full.
    pub fn push(&self, event: KeyEvent) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let next = (head + 1) % QUEUE_CAPACITY;
        if next == self.tail.load(Ordering::Acquire) {
            return false;
        }
        unsafe {
            (*self.slots.get())[head] = event;
        }
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<KeyEvent> {
        let tail = self.tail.load(Ordering::Relaxed);
        if tail == self.head.load(Ordering::Acquire) {
            return None;
        }
        let event = unsafe { (*self.slots.get())[tail] };
        self.tail.store((tail + 1) % QUEUE_CAPACITY, Ordering::Release);
        Some(event)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + QUEUE_CAPACITY - tail) % QUEUE_CAPACITY
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
