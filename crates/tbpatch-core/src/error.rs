//! Error types for tbpatch-core
//!
//! This module provides a no_std compatible error type that is shared by the
//! patch model, the TPS6598x device layer and the patch engine.

use core::fmt;

use crate::tps::{FlashState, FourCc};

/// Failure reported by the register transport
///
/// Carries the raw status code returned by the HPM driver binding (an
/// `IOReturn`-style value on hosts that have one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFault {
    /// Driver status code
    pub code: i32,
}

impl TransportFault {
    /// Create a fault from a driver status code
    pub const fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for TransportFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failure (status 0x{:08X})", self.code as u32)
    }
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Transport errors
    /// The bus or driver failed; never retried by the core
    Transport(TransportFault),

    // Register errors
    /// The chip reported the register as invalid
    RegisterUnsupported {
        /// Register address
        reg: u8,
    },
    /// Register payload is larger than the 64-byte register maximum
    PayloadTooLarge {
        /// Requested payload length
        len: usize,
    },

    // Command errors
    /// The command did not complete within the poll budget
    CommandTimeout {
        /// Command that was outstanding
        cmd: FourCc,
    },
    /// The command completed with a nonzero task status
    CommandError {
        /// Command that failed
        cmd: FourCc,
        /// Task completion status reported by the chip
        status: u8,
    },
    /// The chip did not recognise the command (`!CMD`)
    CommandUnrecognized {
        /// Command that was rejected
        cmd: FourCc,
    },

    // Flash protocol errors
    /// Erase completed with a nonzero status
    EraseFailed {
        /// Task completion status reported by the chip
        status: u8,
    },
    /// A write chunk failed; bytes past `written` are indeterminate
    PartialWrite {
        /// Bytes fully written before the failing chunk
        written: u32,
    },
    /// Read-back differs from the bytes that were written
    VerifyMismatch {
        /// Image offset of the first mismatching byte
        offset: u32,
    },
    /// Flash primitive issued from a state that does not allow it
    InvalidFlashState {
        /// State the operation requires
        expected: FlashState,
        /// State the device was in
        found: FlashState,
    },

    // Data classification
    /// On-device data matches neither the original nor the replacement
    UnexpectedContent,

    // Caller input validation
    /// Patch has zero size, mismatched buffers or overflows the image
    InvalidPatch,
    /// Range has zero size or overflows the image
    InvalidRange,
    /// Range is not contained in the enclosing range
    OutOfRange,
}

impl Error {
    /// Whether the engine may retry the region after this error
    ///
    /// Command-level and flash-protocol failures are retried. Transport
    /// failures, classification conflicts and input validation errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. }
                | Self::CommandError { .. }
                | Self::CommandUnrecognized { .. }
                | Self::EraseFailed { .. }
                | Self::PartialWrite { .. }
                | Self::VerifyMismatch { .. }
        )
    }

    /// Whether this error means the bus itself is unusable
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<TransportFault> for Error {
    fn from(fault: TransportFault) -> Self {
        Self::Transport(fault)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(fault) => write!(f, "{}", fault),
            Self::RegisterUnsupported { reg } => {
                write!(f, "register 0x{:02X} not supported by the chip", reg)
            }
            Self::PayloadTooLarge { len } => {
                write!(f, "register payload of {} bytes exceeds 64 bytes", len)
            }
            Self::CommandTimeout { cmd } => write!(f, "command '{}' timed out", cmd),
            Self::CommandError { cmd, status } => {
                write!(f, "command '{}' failed with status 0x{:X}", cmd, status)
            }
            Self::CommandUnrecognized { cmd } => {
                write!(f, "command '{}' not recognized by the chip", cmd)
            }
            Self::EraseFailed { status } => {
                write!(f, "flash erase failed with status 0x{:X}", status)
            }
            Self::PartialWrite { written } => {
                write!(f, "flash write failed after {} bytes", written)
            }
            Self::VerifyMismatch { offset } => {
                write!(f, "verify failed: first mismatch at 0x{:08X}", offset)
            }
            Self::InvalidFlashState { expected, found } => {
                write!(f, "flash operation requires {} state, device is {}", expected, found)
            }
            Self::UnexpectedContent => {
                write!(f, "device data matches neither original nor replacement")
            }
            Self::InvalidPatch => write!(f, "invalid patch"),
            Self::InvalidRange => write!(f, "invalid range"),
            Self::OutOfRange => write!(f, "patch outside of patch set range"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
