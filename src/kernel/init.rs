//! Kernel initialization phases

use crate::boot::BootHandoff;
use crate::config::KernelConfig;
use crate::cpu;
use crate::error::SetupError;
use crate::interrupts::{self, gdt};
use crate::kernel::status::{
    ensure_all_ready, register_component, update_component_status, InitStatus,
};
use crate::{kprintln, logger};

const LOGGER: &str = "Serial Logger";
const BOOT: &str = "Boot Handoff";
const CONFIG: &str = "Configuration";
const CORE: &str = "Interrupt Core";
const SEGMENTS: &str = "GDT/TSS";
const IDT: &str = "Descriptor Table";
const PIC: &str = "Interrupt Controller";
const TIMER: &str = "Interval Timer";
const LINES: &str = "IRQ Lines";

const PHASES: [&str; 9] = [LOGGER, BOOT, CONFIG, CORE, SEGMENTS, IDT, PIC, TIMER, LINES];

/// Bring up the interrupt system. Returns with interrupts still disabled;
/// the caller decides when to set IF.
pub fn init_kernel(handoff: BootHandoff, config: &KernelConfig) -> Result<(), SetupError> {
    if cpu::interrupts_enabled() {
        return Err(SetupError::InterruptsEnabled);
    }
    for name in PHASES {
        register_component(name)?;
    }

    init_phase(1, LOGGER, || logger::init(config.log_level))?;
    init_phase(2, BOOT, || handoff.validate().map(|_| ()))?;
    init_phase(3, CONFIG, || config.validate())?;
    init_phase(4, CORE, || interrupts::create_core(config))?;

    kprintln!("irqkernel: bringing up interrupts");

    // Gates take whatever CS the GDT reload left us in.
    let code_selector = init_phase(5, SEGMENTS, || {
        gdt::init();
        Ok(cpu::code_selector())
    })?;
    init_phase(6, IDT, || {
        interrupts::load_idt(code_selector, config.pic_offsets)
    })?;
    init_phase(7, PIC, || interrupts::remap_pic(config.pic_offsets))?;
    init_phase(8, TIMER, || interrupts::start_timer(config.timer_hz))?;
    init_phase(9, LINES, || {
        interrupts::unmask_lines(config.unmasked_lines)
    })?;

    ensure_all_ready()?;
    if cpu::interrupts_enabled() {
        return Err(SetupError::InterruptsEnabled);
    }
    kprintln!("irqkernel: interrupt system ready");
    Ok(())
}

fn init_phase<T>(
    step: usize,
    name: &'static str,
    init_fn: impl FnOnce() -> Result<T, SetupError>,
) -> Result<T, SetupError> {
    update_component_status(name, InitStatus::InProgress);
    log::debug!("[{}/{}] {}...", step, PHASES.len(), name);

    match init_fn() {
        Ok(value) => {
            update_component_status(name, InitStatus::Completed);
            log::info!("[{}/{}] {} ok", step, PHASES.len(), name);
            kprintln!("[{}/{}] {} ok", step, PHASES.len(), name);
            Ok(value)
        }
        Err(e) => {
            update_component_status(name, InitStatus::Failed(e));
            log::error!("[{}/{}] {} failed: {}", step, PHASES.len(), name, e);
            Err(e)
        }
    }
}
