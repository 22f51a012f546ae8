use core::fmt;

/// Everything that can go wrong while bringing the interrupt system up.
///
/// None of these can happen once interrupts are enabled: after that point
/// handlers only ever report a [`Disposition`](crate::interrupts::handlers::Disposition).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupError {
    MissingBootMagic,
    InterruptsEnabled,
    PicOffsetInExceptionRange { offset: u8 },
    PicOffsetMisaligned { offset: u8 },
    PicOffsetsOverlap { master: u8, slave: u8 },
    PicRangeCollides { offset: u8, vector: u8 },
    NullCodeSelector,
    MissingDescriptor { vector: u8 },
    MalformedDescriptor { vector: u8 },
    IdtReadbackMismatch { expected: u64, loaded: u64 },
    TimerFrequencyOutOfRange { hz: u32 },
    ZeroTickInterval,
    LoggerInstalled,
    CoreInitialized,
    CoreMissing,
    TooManyPhases,
    PhaseIncomplete { name: &'static str },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::MissingBootMagic => write!(f, "boot loader passed no magic value"),
            SetupError::InterruptsEnabled => {
                write!(f, "interrupts were enabled before setup finished")
            }
            SetupError::PicOffsetInExceptionRange { offset } => {
                write!(f, "PIC offset {:#x} overlaps CPU exception vectors", offset)
            }
            SetupError::PicOffsetMisaligned { offset } => {
                write!(f, "PIC offset {:#x} is not a multiple of 8", offset)
            }
            SetupError::PicOffsetsOverlap { master, slave } => write!(
                f,
                "PIC ranges overlap (master {:#x}, slave {:#x})",
                master, slave
            ),
            SetupError::PicRangeCollides { offset, vector } => write!(
                f,
                "PIC range at {:#x} covers reserved vector {:#x}",
                offset, vector
            ),
            SetupError::NullCodeSelector => write!(f, "IDT built with a null code selector"),
            SetupError::MissingDescriptor { vector } => {
                write!(f, "IDT vector {} has no handler", vector)
            }
            SetupError::MalformedDescriptor { vector } => {
                write!(f, "IDT vector {} has a malformed descriptor", vector)
            }
            SetupError::IdtReadbackMismatch { expected, loaded } => write!(
                f,
                "IDTR readback mismatch (expected {:#x}, loaded {:#x})",
                expected, loaded
            ),
            SetupError::TimerFrequencyOutOfRange { hz } => {
                write!(f, "timer frequency {} Hz is out of range", hz)
            }
            SetupError::ZeroTickInterval => write!(f, "tick report interval must be non-zero"),
            SetupError::LoggerInstalled => write!(f, "a logger is already installed"),
            SetupError::CoreInitialized => write!(f, "interrupt core already initialised"),
            SetupError::CoreMissing => write!(f, "interrupt core not initialised"),
            SetupError::TooManyPhases => write!(f, "init phase registry is full"),
            SetupError::PhaseIncomplete { name } => {
                write!(f, "init phase '{}' did not complete", name)
            }
        }
    }
}
