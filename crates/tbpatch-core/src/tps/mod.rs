//! TPS6598x device layer
//!
//! [`Tps6598xDevice`] owns one chip's bus address and register transport.
//! It exposes register accessors, 4CC command execution, the cached
//! identification attributes, and the flash protocol built on top of them.

pub mod commands;
mod device;
mod flash;
mod identity;
pub mod registers;

pub use commands::FourCc;
pub use device::{CommandTimings, DeviceConfig, Tps6598xDevice};
pub use flash::FlashState;
pub use identity::DeviceIdentity;
pub use registers::{RegisterBuf, MAX_REGISTER_SIZE};
