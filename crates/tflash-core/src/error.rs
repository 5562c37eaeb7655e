//! Error types for tflash-core
//!
//! This module provides a no_std compatible error type that is shared by the
//! flash engine and by the drivers plugged into it.

use core::fmt;

/// Reasons a region geometry is rejected at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Region length is zero
    EmptyRegion,
    /// `start + length` does not fit in the 32-bit address space
    AddressOverflow,
    /// Block size is zero or not a power of two
    BlockSize(u32),
    /// Write size is zero or not a power of two
    WriteSize(u32),
    /// Write buffer size is zero, not a power of two, or smaller than the write size
    WriteBufferSize(u32),
    /// Region start or length is not aligned to the block or write buffer size
    Unaligned {
        /// Alignment the region violates
        alignment: u32,
    },
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Address errors
    /// Address is not covered by any registered flash region
    AddressOutOfRange {
        /// First address that could not be mapped
        addr: u32,
    },

    // Lifecycle errors
    /// Entering flash mode (or the fallback reset) failed
    ModeEntryFailed,
    /// Leaving flash mode (or the fallback reset) failed
    ModeExitFailed,
    /// A region's prepare hook failed
    PrepareFailed {
        /// Start address of the region
        region: u32,
    },
    /// A region's done hook failed
    FinalizeFailed {
        /// Start address of the region
        region: u32,
    },
    /// `complete` was called without an active flash session
    NotInFlashMode,

    // Operation errors
    /// Hardware erase of a block failed
    EraseFailed {
        /// Block address passed to the driver
        addr: u32,
    },
    /// Hardware program of a write chunk failed
    WriteFailed {
        /// Chunk address passed to the driver
        addr: u32,
    },
    /// Write buffer could not be allocated
    AllocationFailed {
        /// Requested buffer size in bytes
        size: usize,
    },

    // Driver-reported errors
    /// Driver detected a hardware fault
    HardwareFault,

    // Registration errors
    /// Region geometry cannot be handled by the engine
    InvalidGeometry(GeometryError),
    /// Target description lists no flash regions
    NoRegions,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRegion => write!(f, "region length is zero"),
            Self::AddressOverflow => write!(f, "region extends past the 32-bit address space"),
            Self::BlockSize(size) => {
                write!(f, "block size {:#x} is not a power of two", size)
            }
            Self::WriteSize(size) => {
                write!(f, "write size {:#x} is not a power of two", size)
            }
            Self::WriteBufferSize(size) => write!(
                f,
                "write buffer size {:#x} is not a power of two at least as large as the write size",
                size
            ),
            Self::Unaligned { alignment } => {
                write!(f, "region bounds are not aligned to {:#x}", alignment)
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} is outside every flash region", addr)
            }
            Self::ModeEntryFailed => write!(f, "failed to enter flash mode"),
            Self::ModeExitFailed => write!(f, "failed to exit flash mode"),
            Self::PrepareFailed { region } => {
                write!(f, "failed to prepare flash region at 0x{:08X}", region)
            }
            Self::FinalizeFailed { region } => {
                write!(f, "failed to finalize flash region at 0x{:08X}", region)
            }
            Self::NotInFlashMode => write!(f, "target is not in flash mode"),
            Self::EraseFailed { addr } => write!(f, "erase failed at 0x{:08X}", addr),
            Self::WriteFailed { addr } => write!(f, "write failed at 0x{:08X}", addr),
            Self::AllocationFailed { size } => {
                write!(f, "failed to allocate {} byte write buffer", size)
            }
            Self::HardwareFault => write!(f, "hardware fault"),
            Self::InvalidGeometry(e) => write!(f, "invalid region geometry: {}", e),
            Self::NoRegions => write!(f, "target has no flash regions"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GeometryError {}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<GeometryError> for Error {
    fn from(e: GeometryError) -> Self {
        Self::InvalidGeometry(e)
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
