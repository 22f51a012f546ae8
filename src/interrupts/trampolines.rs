//! # Entry Trampolines
//!
//! One 16-byte stub per vector, generated in assembly. Each stub normalises
//! the stack to a [`TrapFrame`] and funnels into a single common path:
//!
//! ```text
//! vector N stub                isr_common                     trap_entry
//! ┌──────────────────┐         ┌────────────────────────┐     ┌──────────────┐
//! │ push 0 (if no    │         │ cli, cld               │     │ read CR2     │
//! │   CPU error code)│──jmp──▶ │ push rax .. r15        │────▶│ lock core    │
//! │ push N           │         │ rdi = rsp, align, call │     │ dispatch     │
//! └──────────────────┘         │ pop r15 .. rax         │◀────│ (EOI inside) │
//!                              │ drop vector + err      │     └──────────────┘
//!                              │ iretq                  │
//!                              └────────────────────────┘
//! ```
//!
//! Interrupt gates enter with IF clear. Trap gates (`int3`, `int 0x80`) enter
//! with IF still set, so an IRQ can land during the stub's pushes or its
//! `jmp`, before `isr_common` executes `cli`. That nested entry builds its own
//! frame below the partial one and returns before the outer stub resumes; the
//! core lock is not held yet, so it dispatches normally. From `cli` onward the
//! save/dispatch/restore sequence runs without nesting.

use core::arch::global_asm;

use crate::cpu;
use crate::interrupts::frame::TrapFrame;
use crate::interrupts::handlers::Disposition;
use crate::interrupts::vectors::PAGE_FAULT;

/// Distance between consecutive stubs.
pub const STUB_STRIDE: u64 = 16;

global_asm!(
    r#"
.pushsection .text.isr_stubs,"ax"

.balign 16
.global isr_stubs_start
isr_stubs_start:
.set isr_vector, 0
.rept 256
    .balign 16
    .if (isr_vector == 8) + ((isr_vector >= 10) * (isr_vector <= 14)) + (isr_vector == 17) + (isr_vector == 21) + (isr_vector == 29) + (isr_vector == 30)
    .else
    .byte 0x6a, 0x00
    .endif
    .byte 0x6a, isr_vector
    jmp isr_common
    .set isr_vector, isr_vector + 1
.endr

.balign 16
.global isr_common
isr_common:
    cli
    cld
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15

    mov rdi, rsp
    mov rbx, rsp
    and rsp, -16
    call trap_entry
    mov rsp, rbx

.global isr_restore
isr_restore:
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
    add rsp, 16
    iretq

.popsection
"#
);

extern "C" {
    static isr_stubs_start: u8;
    static isr_common: u8;
    static isr_restore: u8;
}

/// Address of the stub for `vector`.
pub fn entry_address(vector: u8) -> u64 {
    let base = unsafe { core::ptr::addr_of!(isr_stubs_start) } as u64;
    base + vector as u64 * STUB_STRIDE
}

/// Called by `isr_common` with interrupts disabled and `frame` pointing at
/// the saved context on the interrupt stack.
#[no_mangle]
extern "C" fn trap_entry(frame: &mut TrapFrame) {
    // CR2 is overwritten by the next page fault, so take it first.
    let fault_address = if frame.vector() == PAGE_FAULT {
        cpu::fault_address()
    } else {
        0
    };

    let disposition = match super::CORE.get() {
        Some(core) => match core.try_lock() {
            Some(mut core) => core.dispatch(frame, fault_address),
            None => {
                log::error!(
                    "vector {} raised while the interrupt core was held",
                    frame.vector()
                );
                frame.dump();
                Disposition::Halt
            }
        },
        None => {
            log::error!("vector {} raised before the interrupt core existed", frame.vector());
            frame.dump();
            Disposition::Halt
        }
    };

    if disposition == Disposition::Halt {
        cpu::halt_forever();
    }
}
