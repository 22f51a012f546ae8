pub mod port;
pub mod ps2_keyboard;
pub mod vga;
