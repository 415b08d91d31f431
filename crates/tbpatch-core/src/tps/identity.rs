//! Identification attributes
//!
//! The attributes are read once by [`Tps6598xDevice::ensure_loaded`] and
//! cached until [`Tps6598xDevice::invalidate_identity`] is called.

use core::fmt::Write;

use maybe_async::maybe_async;

use super::registers::{self, RegisterBuf, MAX_REGISTER_SIZE};
use super::Tps6598xDevice;
use crate::error::{Error, Result};
use crate::hpm::RegisterTransport;

/// Text attribute decoded from a register
pub type IdentString = heapless::String<MAX_REGISTER_SIZE>;

/// Cached identification of one controller
///
/// Every field is optional: a register the chip does not implement leaves
/// its attribute empty instead of failing the whole load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Vendor ID (register 0x00)
    pub vendor_id: Option<u32>,
    /// Device ID (register 0x01, little-endian)
    pub device_id: Option<u64>,
    /// Unique ID as `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`
    pub uuid: Option<heapless::String<36>>,
    /// Firmware version as `major.minor.patch`
    pub version: Option<heapless::String<16>>,
    /// Firmware build description
    pub build: Option<IdentString>,
    /// Device information string
    pub device: Option<IdentString>,
}

impl DeviceIdentity {
    /// Decode the identification registers
    pub fn decode(
        vid: Option<&[u8]>,
        did: Option<&[u8]>,
        uid: Option<&[u8]>,
        version: Option<&[u8]>,
        build: Option<&[u8]>,
        device: Option<&[u8]>,
    ) -> Self {
        Self {
            vendor_id: vid.map(|b| le_u64(b) as u32),
            device_id: did.map(le_u64),
            uuid: uid.and_then(format_uuid),
            version: version.and_then(format_version),
            build: build.map(ascii_string),
            device: device.map(ascii_string),
        }
    }
}

fn le_u64(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .take(8)
        .enumerate()
        .fold(0u64, |acc, (i, &b)| acc | (b as u64) << (8 * i))
}

fn format_uuid(bytes: &[u8]) -> Option<heapless::String<36>> {
    if bytes.len() < 16 {
        return None;
    }
    let mut s = heapless::String::new();
    for (i, b) in bytes[..16].iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            s.push('-').ok()?;
        }
        write!(s, "{:02x}", b).ok()?;
    }
    Some(s)
}

/// Version register holds BCD `major.minor.patch` in a little-endian u32
fn format_version(bytes: &[u8]) -> Option<heapless::String<16>> {
    if bytes.len() < 4 {
        return None;
    }
    let v = le_u64(&bytes[..4]) as u32;
    let mut s = heapless::String::new();
    write!(s, "{:X}.{:X}.{:X}", v >> 16, (v >> 8) & 0xFF, v & 0xFF).ok()?;
    Some(s)
}

fn ascii_string(bytes: &[u8]) -> IdentString {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let mut s = IdentString::new();
    for &b in &bytes[..end] {
        let c = if b.is_ascii_graphic() || b == b' ' {
            b as char
        } else {
            '?'
        };
        // Capacity matches the register maximum
        let _ = s.push(c);
    }
    let trimmed_len = s.trim_end().len();
    s.truncate(trimmed_len);
    s
}

impl<T: RegisterTransport> Tps6598xDevice<T> {
    /// Cached identification, if already loaded
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref()
    }

    /// Drop the cached identification so the next load re-reads it
    pub fn invalidate_identity(&mut self) {
        self.identity = None;
    }

    /// Load the identification registers once and return the cache
    ///
    /// Registers the chip reports as unsupported leave their attribute
    /// empty. Any other failure is returned and nothing is cached.
    #[maybe_async]
    pub async fn ensure_loaded(&mut self) -> Result<&DeviceIdentity> {
        if self.identity.is_none() {
            let vid = self.read_optional(registers::VID).await?;
            let did = self.read_optional(registers::DID).await?;
            let uid = self.read_optional(registers::UID).await?;
            let version = self.read_optional(registers::VERSION).await?;
            let build = self.read_optional(registers::BUILD).await?;
            let device = self.read_optional(registers::DEV_INFO).await?;

            let identity = DeviceIdentity::decode(
                vid.as_deref(),
                did.as_deref(),
                uid.as_deref(),
                version.as_deref(),
                build.as_deref(),
                device.as_deref(),
            );
            log::debug!(
                "TPS 0x{:X}: version {:?}, device {:?}",
                self.address(),
                identity.version,
                identity.device
            );
            self.identity = Some(identity);
        }

        Ok(self.identity.get_or_insert_with(DeviceIdentity::default))
    }

    #[maybe_async]
    async fn read_optional(&mut self, reg: u8) -> Result<Option<RegisterBuf>> {
        match self.read_register(reg).await {
            Ok(buf) => Ok(Some(buf)),
            Err(Error::RegisterUnsupported { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
