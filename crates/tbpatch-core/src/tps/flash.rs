//! Flash protocol
//!
//! Every region operation walks the states
//! `Idle -> RegionSelected -> Erased -> Written -> Verified`, with `Failed`
//! reachable from any of them. The primitives (`flash_*`) check and advance
//! the state; the eeprom façade (`eeprom_*`) drives a whole sequence and
//! always returns the device to `Idle`, so each call can be retried on its
//! own.
//!
//! Offsets given to these operations are relative to the base of the
//! selected flash region.

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;

use maybe_async::maybe_async;

use super::commands::{self, FourCc, COMMAND_IO_SIZE, SECTOR_SIZE};
use super::Tps6598xDevice;
use crate::error::{Error, Result};
use crate::hpm::RegisterTransport;

/// Value of erased flash
const ERASED_VALUE: u8 = 0xFF;

/// Flash protocol state of a device session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashState {
    /// No region selected
    #[default]
    Idle,
    /// Active region pointer read
    RegionSelected,
    /// A span has been erased and may be written
    Erased,
    /// A span has been written and may be verified
    Written,
    /// The written span read back correctly
    Verified,
    /// A primitive failed; the session must be ended
    Failed,
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::RegionSelected => "region-selected",
            Self::Erased => "erased",
            Self::Written => "written",
            Self::Verified => "verified",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Per-session flash state kept by the device
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct FlashSession {
    state: FlashState,
    region_base: u32,
    /// Span erased in this session: (offset, len)
    erased: Option<(u32, u32)>,
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn addr_input(addr: u32) -> [u8; COMMAND_IO_SIZE] {
    let mut input = [0u8; COMMAND_IO_SIZE];
    input[..4].copy_from_slice(&addr.to_le_bytes());
    input
}

impl<T: RegisterTransport> Tps6598xDevice<T> {
    /// Current flash protocol state
    pub fn flash_state(&self) -> FlashState {
        self.session.state
    }

    /// Base address of the selected region (valid once selected)
    pub fn region_base(&self) -> Option<u32> {
        match self.session.state {
            FlashState::Idle => None,
            _ => Some(self.session.region_base),
        }
    }

    /// End the session and return to `Idle`
    pub fn end_session(&mut self) {
        if self.session.state != FlashState::Idle {
            log::trace!(
                "TPS 0x{:X}: ending flash session in {} state",
                self.address(),
                self.session.state
            );
        }
        self.session = Default::default();
    }

    fn require_state(&self, allowed: &[FlashState]) -> Result<()> {
        let found = self.session.state;
        if allowed.contains(&found) {
            Ok(())
        } else {
            Err(Error::InvalidFlashState {
                expected: allowed[0],
                found,
            })
        }
    }

    fn absolute(&self, offset: u32, len: usize) -> Result<u32> {
        let len = u32::try_from(len).map_err(|_| Error::InvalidRange)?;
        let start = self
            .session
            .region_base
            .checked_add(offset)
            .ok_or(Error::InvalidRange)?;
        start.checked_add(len).ok_or(Error::InvalidRange)?;
        Ok(start)
    }

    /// Run a command and mark the session failed if it errors
    #[maybe_async]
    async fn session_command(
        &mut self,
        cmd: FourCc,
        input: &[u8; COMMAND_IO_SIZE],
    ) -> Result<[u8; COMMAND_IO_SIZE]> {
        let result = self.run_command(cmd, input).await;
        if result.is_err() {
            self.session.state = FlashState::Failed;
        }
        result
    }

    /// Select the configured flash region (`FLrr`)
    ///
    /// Reads the region pointer and moves `Idle -> RegionSelected`. Calling
    /// it again once a region is selected is a no-op.
    #[maybe_async]
    pub async fn flash_select_active_region(&mut self) -> Result<u32> {
        match self.session.state {
            FlashState::Idle => {}
            FlashState::Failed => {
                return Err(Error::InvalidFlashState {
                    expected: FlashState::Idle,
                    found: FlashState::Failed,
                })
            }
            _ => return Ok(self.session.region_base),
        }

        let mut input = [0u8; COMMAND_IO_SIZE];
        input[0] = self.config.region;
        let output = self
            .session_command(commands::FLASH_ACTIVE_REGION, &input)
            .await?;

        self.session.region_base = le_u32(&output);
        self.session.state = FlashState::RegionSelected;
        log::debug!(
            "TPS 0x{:X}: region {} at 0x{:08X}",
            self.address(),
            self.config.region,
            self.session.region_base
        );
        Ok(self.session.region_base)
    }

    /// Set the flash address pointer (`FLad`)
    #[maybe_async]
    async fn flash_address_start(&mut self, addr: u32) -> Result<()> {
        self.session_command(commands::FLASH_ADDRESS_START, &addr_input(addr))
            .await
            .map(|_| ())
    }

    /// Erase `len` bytes at `offset` (`FLad` + `FLem`)
    ///
    /// Valid from `RegionSelected` or `Erased`. Erased bytes read back as
    /// 0xFF until written.
    ///
    /// # Errors
    /// * `EraseFailed` - if the chip reports a nonzero erase status; the
    ///   span must be erased again before it is written
    #[maybe_async]
    pub async fn flash_erase(&mut self, offset: u32, len: u32) -> Result<()> {
        self.require_state(&[FlashState::RegionSelected, FlashState::Erased])?;
        if len == 0 {
            return Err(Error::InvalidRange);
        }
        let addr = self.absolute(offset, len as usize)?;

        log::debug!("TPS 0x{:X}: erasing {} bytes at 0x{:08X}", self.address(), len, addr);
        self.flash_address_start(addr).await?;

        let timings = self.config.erase_timings;
        let result = self
            .run_command_with_timings(commands::FLASH_ERASE, &addr_input(len), timings)
            .await;
        match result {
            Ok(_) => {
                self.session.state = FlashState::Erased;
                self.session.erased = Some((offset, len));
                Ok(())
            }
            Err(e) => {
                self.session.state = FlashState::Failed;
                self.session.erased = None;
                match e {
                    Error::CommandError { status, .. } => Err(Error::EraseFailed { status }),
                    other => Err(other),
                }
            }
        }
    }

    /// Erase `count` 4 KiB sectors starting at `offset` (`FLer`)
    ///
    /// `offset` must be sector aligned. Same state rules as
    /// [`flash_erase`](Self::flash_erase).
    #[maybe_async]
    pub async fn flash_erase_sectors(&mut self, offset: u32, count: u8) -> Result<()> {
        self.require_state(&[FlashState::RegionSelected, FlashState::Erased])?;
        if count == 0 || offset % SECTOR_SIZE != 0 {
            return Err(Error::InvalidRange);
        }
        let len = SECTOR_SIZE * count as u32;
        let addr = self.absolute(offset, len as usize)?;

        let mut input = addr_input(addr);
        input[4] = count;
        let timings = self.config.erase_timings;
        let result = self
            .run_command_with_timings(commands::FLASH_ERASE_REGION, &input, timings)
            .await;
        match result {
            Ok(_) => {
                self.session.state = FlashState::Erased;
                self.session.erased = Some((offset, len));
                Ok(())
            }
            Err(e) => {
                self.session.state = FlashState::Failed;
                self.session.erased = None;
                match e {
                    Error::CommandError { status, .. } => Err(Error::EraseFailed { status }),
                    other => Err(other),
                }
            }
        }
    }

    /// Program `data` at `offset` (`FLad` + `FLwd` per chunk)
    ///
    /// Valid only from `Erased`, and only inside the span erased in this
    /// session. Chunks are issued in offset order; a short final chunk is
    /// padded with 0xFF. The padding addresses bytes past the erased span
    /// but cannot change them, since programming only clears bits.
    ///
    /// # Errors
    /// * `PartialWrite` - if a chunk fails; bytes from `written` onwards are
    ///   indeterminate and the span must be erased again
    #[maybe_async]
    pub async fn flash_write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.require_state(&[FlashState::Erased])?;
        if data.is_empty() {
            return Err(Error::InvalidRange);
        }
        let addr = self.absolute(offset, data.len())?;
        match self.session.erased {
            Some((start, len))
                if offset >= start && offset as u64 + data.len() as u64 <= start as u64 + len as u64 => {}
            _ => return Err(Error::OutOfRange),
        }

        self.flash_address_start(addr).await?;

        // FLwd always advances the pointer by a full command payload
        let chunk_size = self.config.chunk_size();
        let repoint = chunk_size < COMMAND_IO_SIZE;
        let mut written = 0u32;
        for chunk in data.chunks(chunk_size) {
            // A short chunk is padded with 0xFF, so FLwd programs up to 15
            // bytes past the end of `data`. Programming 0xFF cannot clear
            // bits, so those bytes keep their content; only `data` itself is
            // confined to the erased span.
            let mut input = [ERASED_VALUE; COMMAND_IO_SIZE];
            input[..chunk.len()].copy_from_slice(chunk);

            let result = if repoint && written > 0 {
                match self.flash_address_start(addr + written).await {
                    Ok(()) => self.run_command(commands::FLASH_WRITE, &input).await,
                    Err(e) => Err(e),
                }
            } else {
                self.run_command(commands::FLASH_WRITE, &input).await
            };

            if let Err(e) = result {
                self.session.state = FlashState::Failed;
                log::warn!(
                    "TPS 0x{:X}: write failed at 0x{:08X} after {} bytes: {}",
                    self.address(),
                    addr + written,
                    written,
                    e
                );
                return match e {
                    Error::Transport(_) => Err(e),
                    _ => Err(Error::PartialWrite { written }),
                };
            }
            written += chunk.len() as u32;
        }

        self.session.state = FlashState::Written;
        Ok(())
    }

    /// Read flash into `buf` (`FLrd` per 16 bytes)
    ///
    /// Requires a selected region; does not change the state.
    #[maybe_async]
    pub async fn flash_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        if matches!(self.session.state, FlashState::Idle | FlashState::Failed) {
            return Err(Error::InvalidFlashState {
                expected: FlashState::RegionSelected,
                found: self.session.state,
            });
        }
        let addr = self.absolute(offset, buf.len())?;

        let mut pos = 0u32;
        for chunk in buf.chunks_mut(COMMAND_IO_SIZE) {
            let output = self
                .session_command(commands::FLASH_READ, &addr_input(addr + pos))
                .await?;
            chunk.copy_from_slice(&output[..chunk.len()]);
            pos += chunk.len() as u32;
        }
        Ok(())
    }

    /// Read back `expected.len()` bytes at `offset` and compare
    ///
    /// Valid from `Written`; moves to `Verified` on an exact match.
    ///
    /// # Errors
    /// * `VerifyMismatch` - with the region offset of the first differing byte
    #[maybe_async]
    pub async fn flash_verify(&mut self, offset: u32, expected: &[u8]) -> Result<()> {
        self.require_state(&[FlashState::Written])?;

        let mut actual = vec![0u8; expected.len()];
        self.flash_read(offset, &mut actual).await?;

        if let Some(pos) = actual.iter().zip(expected).position(|(a, e)| a != e) {
            self.session.state = FlashState::Failed;
            let mismatch = offset + pos as u32;
            log::warn!(
                "TPS 0x{:X}: verify mismatch at 0x{:08X}: expected 0x{:02X}, found 0x{:02X}",
                self.address(),
                mismatch,
                expected[pos],
                actual[pos]
            );
            return Err(Error::VerifyMismatch { offset: mismatch });
        }

        self.session.state = FlashState::Verified;
        Ok(())
    }

    /// Ask the chip to validate the selected region's image (`FLvy`)
    #[maybe_async]
    pub async fn flash_verify_image(&mut self) -> Result<()> {
        if matches!(self.session.state, FlashState::Idle | FlashState::Failed) {
            return Err(Error::InvalidFlashState {
                expected: FlashState::RegionSelected,
                found: self.session.state,
            });
        }
        let base = self.session.region_base;
        self.session_command(commands::FLASH_VERIFY, &addr_input(base))
            .await
            .map(|_| ())
    }

    // =========================================================================
    // Eeprom façade
    // =========================================================================

    /// Read `buf.len()` bytes of the selected region at `offset`
    #[maybe_async]
    pub async fn eeprom_read(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        let result = self.eeprom_read_inner(offset, buf).await;
        self.end_session();
        result
    }

    #[maybe_async]
    async fn eeprom_read_inner(&mut self, offset: u32, buf: &mut [u8]) -> Result<()> {
        self.flash_select_active_region().await?;
        self.flash_read(offset, buf).await
    }

    /// Read `len` bytes of the selected region at `offset` into a new buffer
    #[maybe_async]
    pub async fn eeprom_read_vec(&mut self, offset: u32, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.eeprom_read(offset, &mut buf).await?;
        Ok(buf)
    }

    /// Erase `len` bytes of the selected region at `offset`
    #[maybe_async]
    pub async fn eeprom_erase(&mut self, offset: u32, len: u32) -> Result<()> {
        let result = self.eeprom_erase_inner(offset, len).await;
        self.end_session();
        result
    }

    #[maybe_async]
    async fn eeprom_erase_inner(&mut self, offset: u32, len: u32) -> Result<()> {
        self.flash_select_active_region().await?;
        self.flash_erase(offset, len).await
    }

    /// Commit `data` to the selected region at `offset`
    ///
    /// Runs the full select, erase, write and verify sequence so a retry
    /// always starts from a fresh erase, never from the point a previous
    /// write stopped.
    #[maybe_async]
    pub async fn eeprom_write(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let result = self.eeprom_write_inner(offset, data).await;
        self.end_session();
        result
    }

    #[maybe_async]
    async fn eeprom_write_inner(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        let len = u32::try_from(data.len()).map_err(|_| Error::InvalidRange)?;
        self.flash_select_active_region().await?;
        self.flash_erase(offset, len).await?;
        self.flash_write(offset, data).await?;
        self.flash_verify(offset, data).await
    }

    /// Run the chip's own image check on the selected region
    #[maybe_async]
    pub async fn eeprom_verify_image(&mut self) -> Result<()> {
        let result = self.eeprom_verify_image_inner().await;
        self.end_session();
        result
    }

    #[maybe_async]
    async fn eeprom_verify_image_inner(&mut self) -> Result<()> {
        self.flash_select_active_region().await?;
        self.flash_verify_image().await
    }
}
