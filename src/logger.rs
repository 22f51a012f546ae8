//! Serial logging on COM1.
//!
//! `log` records go out as `[LEVEL] target: message` lines. The port lock is
//! always taken with interrupts disabled, so a handler can log without
//! deadlocking against main-line code holding it.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;
use uart_16550::SerialPort;

use crate::error::SetupError;

pub const COM1: u16 = 0x3F8;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1) });

/// Raw serial output, bypassing the `log` filter. Used on the panic path.
#[macro_export]
macro_rules! serial_println {
    () => { $crate::serial_println!("") };
    ($($arg:tt)*) => {{
        $crate::logger::_serial_print(format_args!($($arg)*));
    }};
}

#[doc(hidden)]
pub fn _serial_print(args: core::fmt::Arguments<'_>) {
    x86_64::instructions::interrupts::without_interrupts(|| {
        let mut serial = SERIAL.lock();
        let _ = serial.write_fmt(args);
        let _ = serial.write_str("\n");
    });
}

pub struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        crate::serial_println!(
            "[{:5}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Bring up COM1 and route `log` through it.
pub fn init(level: LevelFilter) -> Result<(), SetupError> {
    x86_64::instructions::interrupts::without_interrupts(|| SERIAL.lock().init());
    log::set_logger(&LOGGER).map_err(|_| SetupError::LoggerInstalled)?;
    log::set_max_level(level);
    Ok(())
}
