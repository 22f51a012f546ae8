#![no_std]
#![no_main]

extern crate rlibc;

use core::panic::PanicInfo;

use irqkernel::boot::BootHandoff;
use irqkernel::config::KernelConfig;
use irqkernel::{cpu, interrupts, kernel, serial_println};

const MULTIBOOT2_HEADER_MAGIC: u32 = 0xE852_50D6;
/// 32-bit protected-mode i386, the only x86 value Multiboot2 defines.
const MULTIBOOT2_ARCH_I386: u32 = 0;
const END_TAG_SIZE: u32 = 8;
const HEADER_LEN: u32 = 16 + END_TAG_SIZE;

#[allow(dead_code)]
#[repr(C, align(8))]
struct Multiboot2Header {
    magic: u32,
    architecture: u32,
    header_length: u32,
    checksum: u32,
    end_type: u16,
    end_flags: u16,
    end_size: u32,
}

// Only the end tag: no framebuffer request, so the loader leaves VGA text
// mode alone.
#[used]
#[no_mangle]
#[link_section = ".multiboot2_header"]
static MULTIBOOT2_HEADER: Multiboot2Header = Multiboot2Header {
    magic: MULTIBOOT2_HEADER_MAGIC,
    architecture: MULTIBOOT2_ARCH_I386,
    header_length: HEADER_LEN,
    checksum: 0u32.wrapping_sub(
        MULTIBOOT2_HEADER_MAGIC
            .wrapping_add(MULTIBOOT2_ARCH_I386)
            .wrapping_add(HEADER_LEN),
    ),
    end_type: 0,
    end_flags: 0,
    end_size: END_TAG_SIZE,
};

/// Entered from the boot stub in long mode, interrupts off, with the
/// loader's magic in `edi` and its info pointer in `rsi`.
#[no_mangle]
pub extern "C" fn kernel_main(magic: u32, info: u64) -> ! {
    let config = KernelConfig::DEFAULT;

    if let Err(e) = kernel::init_kernel(BootHandoff::new(magic, info), &config) {
        kernel::fatal(e);
    }

    kernel::run(&config)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    cpu::disable_interrupts();
    serial_println!("KERNEL PANIC: {}", info);
    interrupts::try_print_error(format_args!("KERNEL PANIC: {}", info));
    cpu::halt_forever()
}
