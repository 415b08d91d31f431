//! TPS6598x register addresses
//!
//! Registers are addressed by one byte and hold up to 64 bytes. The
//! width of each register is chip-defined; readers must honour the length
//! the chip returns.

/// Maximum payload of a single register access
pub const MAX_REGISTER_SIZE: usize = 64;

/// Register contents as returned by the chip
pub type RegisterBuf = heapless::Vec<u8, MAX_REGISTER_SIZE>;

/// Vendor ID
pub const VID: u8 = 0x00;
/// Device ID
pub const DID: u8 = 0x01;
/// Unique ID (16 bytes)
pub const UID: u8 = 0x05;
/// Command register 1 (4CC of the outstanding command)
pub const CMD1: u8 = 0x08;
/// Data register 1 (command input and output)
pub const DATA1: u8 = 0x09;
/// Firmware version (BCD)
pub const VERSION: u8 = 0x0F;
/// Firmware build description
pub const BUILD: u8 = 0x2E;
/// Device information string
pub const DEV_INFO: u8 = 0x2F;
