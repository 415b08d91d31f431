//! 4CC command codes
//!
//! Commands are four ASCII characters packed big-endian into a `u32`, the
//! same value a multi-character literal such as `'FLrr'` has in C.

use core::fmt;

/// Four-character command code
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(u32);

impl FourCc {
    /// Build a code from its four ASCII characters
    pub const fn new(code: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(code))
    }

    /// Wrap a raw 32-bit code
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit code sent to the transport
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The four characters in transmission order
    pub const fn to_bytes(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic()) {
            for &b in &bytes {
                write!(f, "{}", b as char)?;
            }
            Ok(())
        } else {
            write!(f, "0x{:08X}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// Read the region pointer of a flash region
pub const FLASH_ACTIVE_REGION: FourCc = FourCc::new(*b"FLrr");
/// Erase 4 KiB sectors starting at an address
pub const FLASH_ERASE_REGION: FourCc = FourCc::new(*b"FLer");
/// Set the flash address pointer
pub const FLASH_ADDRESS_START: FourCc = FourCc::new(*b"FLad");
/// Read 16 bytes of flash
pub const FLASH_READ: FourCc = FourCc::new(*b"FLrd");
/// Program 16 bytes at the address pointer
pub const FLASH_WRITE: FourCc = FourCc::new(*b"FLwd");
/// Erase a byte span starting at the address pointer
pub const FLASH_ERASE: FourCc = FourCc::new(*b"FLem");
/// Verify the image of a flash region
pub const FLASH_VERIFY: FourCc = FourCc::new(*b"FLvy");

/// CMD1 contents when the chip rejects a command
pub const CMD_REJECTED: [u8; 4] = *b"!CMD";

/// Size of command input and output payloads
pub const COMMAND_IO_SIZE: usize = 16;

/// Mask for the task status in the first DATA1 byte
pub const STATUS_MASK: u8 = 0x0F;

/// Task completed successfully
pub const TASK_SUCCESS: u8 = 0x00;

/// Size of a flash sector for `FLer`
pub const SECTOR_SIZE: u32 = 4096;
