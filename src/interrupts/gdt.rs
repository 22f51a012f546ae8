//! Kernel GDT with a TSS, so the double-fault gate can switch to a known-good
//! stack even when the fault came from a blown kernel stack.

use spin::Lazy;
use x86_64::instructions::segmentation::{Segment, CS, DS, ES, SS};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

/// Slot in the TSS interrupt stack table (0-based, as the TSS indexes it).
pub const DOUBLE_FAULT_IST_INDEX: usize = 0;
/// The same slot as a gate descriptor encodes it (1-based, 0 = no switch).
pub const DOUBLE_FAULT_IST: u8 = DOUBLE_FAULT_IST_INDEX as u8 + 1;

const DOUBLE_FAULT_STACK_SIZE: usize = 4096 * 4;

#[repr(align(16))]
struct Stack([u8; DOUBLE_FAULT_STACK_SIZE]);

static mut DOUBLE_FAULT_STACK: Stack = Stack([0; DOUBLE_FAULT_STACK_SIZE]);

static TSS: Lazy<TaskStateSegment> = Lazy::new(|| {
    let mut tss = TaskStateSegment::new();
    tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX] = {
        let stack_start = VirtAddr::from_ptr(unsafe { core::ptr::addr_of!(DOUBLE_FAULT_STACK) });
        stack_start + DOUBLE_FAULT_STACK_SIZE as u64
    };
    tss
});

struct Selectors {
    code: SegmentSelector,
    data: SegmentSelector,
    tss: SegmentSelector,
}

static GDT: Lazy<(GlobalDescriptorTable, Selectors)> = Lazy::new(|| {
    let mut gdt = GlobalDescriptorTable::new();
    let code = gdt.append(Descriptor::kernel_code_segment());
    let data = gdt.append(Descriptor::kernel_data_segment());
    let tss = gdt.append(Descriptor::tss_segment(&TSS));
    (gdt, Selectors { code, data, tss })
});

/// Load the kernel GDT and TSS and reload the segment registers.
pub fn init() {
    let (ref gdt, ref selectors) = *GDT;
    gdt.load();

    unsafe {
        CS::set_reg(selectors.code);
        DS::set_reg(selectors.data);
        ES::set_reg(selectors.data);
        SS::set_reg(selectors.data);
        load_tss(selectors.tss);
    }

    log::debug!(
        "GDT: code={:#x} data={:#x} tss={:#x}",
        selectors.code.0,
        selectors.data.0,
        selectors.tss.0
    );
}
