//! What the boot loader hands over in registers.

use crate::error::SetupError;

/// EAX after a Multiboot2 loader jumps to the kernel.
pub const MULTIBOOT2_BOOTLOADER_MAGIC: u32 = 0x36D7_6289;
/// EAX after a Multiboot (v1) loader jumps to the kernel.
pub const MULTIBOOT1_BOOTLOADER_MAGIC: u32 = 0x2BAD_B002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootProtocol {
    Multiboot2,
    Multiboot1,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootHandoff {
    pub magic: u32,
    /// Physical address of the loader's information structure. Not parsed.
    pub info: u64,
}

impl BootHandoff {
    pub const fn new(magic: u32, info: u64) -> Self {
        Self { magic, info }
    }

    /// A zero magic means nobody set up the handoff at all; any other value
    /// is accepted, with a warning when it is not a known loader's.
    pub fn validate(&self) -> Result<BootProtocol, SetupError> {
        let protocol = match self.magic {
            0 => return Err(SetupError::MissingBootMagic),
            MULTIBOOT2_BOOTLOADER_MAGIC => BootProtocol::Multiboot2,
            MULTIBOOT1_BOOTLOADER_MAGIC => BootProtocol::Multiboot1,
            other => {
                log::warn!("unrecognised boot magic {:#010x}, continuing", other);
                BootProtocol::Unknown
            }
        };
        log::info!("boot: {:?} (info at {:#x})", protocol, self.info);
        Ok(protocol)
    }
}
