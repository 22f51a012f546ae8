//! Saved CPU context built on the interrupt stack by the entry trampolines.
//!
//! ```text
//!  high addresses
//!  ┌──────────────┐
//!  │ ss           │ ┐
//!  │ rsp          │ │ pushed by the CPU
//!  │ rflags       │ │
//!  │ cs           │ │
//!  │ rip          │ ┘
//!  │ error_code   │   CPU error code, or 0 pushed by the stub
//!  │ vector       │   pushed by the stub
//!  │ rax .. r15   │   pushed by the common path, rax first
//!  └──────────────┘ <- rsp handed to `trap_entry`
//!  low addresses
//! ```

use core::mem::{offset_of, size_of};

use static_assertions::const_assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

/// Bytes pushed by the common path (15 general-purpose registers).
pub const SAVED_GPR_BYTES: usize = 15 * 8;

const_assert_eq!(size_of::<TrapFrame>(), 22 * 8);
const_assert_eq!(offset_of!(TrapFrame, vector), SAVED_GPR_BYTES);
const_assert_eq!(offset_of!(TrapFrame, rip), SAVED_GPR_BYTES + 16);
const_assert_eq!(offset_of!(TrapFrame, ss), SAVED_GPR_BYTES + 16 + 32);
// Whole frame is a multiple of 16 so the handler call sees an aligned stack.
const_assert_eq!(size_of::<TrapFrame>() % 16, 0);

impl TrapFrame {
    /// The stubs push the vector with a sign-extending `push imm8`, so only
    /// the low byte is meaningful.
    #[inline]
    pub fn vector(&self) -> u8 {
        (self.vector & 0xFF) as u8
    }

    #[inline]
    pub fn error_code(&self) -> u64 {
        self.error_code
    }

    #[inline]
    pub fn instruction_pointer(&self) -> u64 {
        self.rip
    }

    /// Resume somewhere else once the handler returns.
    #[inline]
    pub fn set_instruction_pointer(&mut self, rip: u64) {
        self.rip = rip;
    }

    /// Step over a faulting instruction of `len` bytes.
    #[inline]
    pub fn skip_instruction(&mut self, len: u64) {
        self.rip = self.rip.wrapping_add(len);
    }

    /// Byte view of the whole snapshot, for identity checks.
    pub fn as_bytes(&self) -> &[u8; size_of::<TrapFrame>()] {
        unsafe { &*(self as *const TrapFrame as *const [u8; size_of::<TrapFrame>()]) }
    }

    pub fn dump(&self) {
        log::error!(
            "rax={:#018x} rbx={:#018x} rcx={:#018x} rdx={:#018x}",
            self.rax, self.rbx, self.rcx, self.rdx
        );
        log::error!(
            "rsi={:#018x} rdi={:#018x} rbp={:#018x} rsp={:#018x}",
            self.rsi, self.rdi, self.rbp, self.rsp
        );
        log::error!(
            "r8 ={:#018x} r9 ={:#018x} r10={:#018x} r11={:#018x}",
            self.r8, self.r9, self.r10, self.r11
        );
        log::error!(
            "r12={:#018x} r13={:#018x} r14={:#018x} r15={:#018x}",
            self.r12, self.r13, self.r14, self.r15
        );
        log::error!(
            "rip={:#018x} cs={:#06x} rflags={:#018x} ss={:#06x} err={:#x}",
            self.rip, self.cs, self.rflags, self.ss, self.error_code
        );
    }
}
