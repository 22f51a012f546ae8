/// Kernel initialization and bootstrap module
pub mod init;
pub mod status;

pub use init::init_kernel;
pub use status::{ensure_all_ready, register_component, update_component_status, InitStatus};

use crate::config::KernelConfig;
use crate::cpu;
use crate::drivers::ps2_keyboard::Key;
use crate::error::SetupError;
use crate::interrupts;

/// Report a setup failure everywhere it can be seen, then stop.
pub fn fatal(error: SetupError) -> ! {
    log::error!("FATAL: {}", error);
    crate::serial_println!("FATAL: {}", error);
    interrupts::try_print_error(format_args!("FATAL: {}", error));
    cpu::halt_forever()
}

/// Enable interrupts and idle. All work from here on happens in handlers;
/// the loop only forwards decoded keys to the log.
pub fn run(config: &KernelConfig) -> ! {
    cpu::enable_interrupts();
    log::info!("interrupts enabled");

    if config.self_test {
        cpu::raise_software_test();
        cpu::raise_breakpoint();
    }

    loop {
        while let Some(event) = interrupts::next_key_event() {
            match event.key {
                Key::Char(c) => log::debug!(
                    "key {:?} ctrl={} alt={} shift={}",
                    c,
                    event.ctrl,
                    event.alt,
                    event.shift
                ),
                Key::Arrow(arrow) => log::debug!("key {:?}", arrow),
            }
        }
        cpu::wait_for_interrupt();
    }
}
