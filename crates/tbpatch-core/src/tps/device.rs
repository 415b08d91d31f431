//! TPS6598x register and command layer

use maybe_async::maybe_async;

use super::commands::{self, FourCc, COMMAND_IO_SIZE, STATUS_MASK, TASK_SUCCESS};
use super::flash::FlashSession;
use super::identity::DeviceIdentity;
use super::registers::{self, RegisterBuf, MAX_REGISTER_SIZE};
use crate::error::{Error, Result};
use crate::hpm::RegisterTransport;

/// Poll budget for one 4CC command
///
/// A command is polled every `poll_delay_us` until it completes or
/// `timeout_us` has elapsed, at which point it fails with `CommandTimeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTimings {
    /// Delay between polls of the command register
    pub poll_delay_us: u32,
    /// Maximum time to wait for completion
    pub timeout_us: u32,
}

impl CommandTimings {
    /// Budget for ordinary commands: poll every 1ms for up to 1s
    pub const DEFAULT: Self = Self {
        poll_delay_us: 1_000,
        timeout_us: 1_000_000,
    };

    /// Budget for erase commands: poll every 10ms for up to 5s
    pub const ERASE: Self = Self {
        poll_delay_us: 10_000,
        timeout_us: 5_000_000,
    };

    /// Number of polls allowed by this budget (at least one)
    pub fn max_polls(&self) -> u32 {
        let polls = if self.poll_delay_us > 0 {
            self.timeout_us / self.poll_delay_us
        } else {
            // Fall back to polling once per microsecond
            self.timeout_us
        };
        polls.max(1)
    }
}

impl Default for CommandTimings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Bytes programmed per `FLwd` command (1..=16)
    pub write_chunk_size: usize,
    /// Flash region whose pointer `FLrr` selects (0 = active image)
    pub region: u8,
    /// Poll budget for ordinary commands
    pub timings: CommandTimings,
    /// Poll budget for erase commands
    pub erase_timings: CommandTimings,
}

impl DeviceConfig {
    /// Chunk size clamped to what one command can carry
    pub fn chunk_size(&self) -> usize {
        self.write_chunk_size.clamp(1, COMMAND_IO_SIZE)
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            write_chunk_size: COMMAND_IO_SIZE,
            region: 0,
            timings: CommandTimings::DEFAULT,
            erase_timings: CommandTimings::ERASE,
        }
    }
}

/// One TPS6598x controller behind an HPM transport
///
/// The device owns its transport exclusively; dropping the device releases
/// it. All commands are issued synchronously and polled to completion, so
/// at most one command is ever outstanding for this chip address.
pub struct Tps6598xDevice<T: RegisterTransport> {
    pub(super) transport: T,
    address: u64,
    pub(super) config: DeviceConfig,
    pub(super) identity: Option<DeviceIdentity>,
    pub(super) session: FlashSession,
}

impl<T: RegisterTransport> Tps6598xDevice<T> {
    /// Create a device at bus `address` with default configuration
    pub fn new(transport: T, address: u64) -> Self {
        Self::with_config(transport, address, DeviceConfig::default())
    }

    /// Create a device at bus `address` with the given configuration
    pub fn with_config(transport: T, address: u64, config: DeviceConfig) -> Self {
        Self {
            transport,
            address,
            config,
            identity: None,
            session: FlashSession::default(),
        }
    }

    /// Bus address of the chip
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Device configuration
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the device and return its transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Read a register
    ///
    /// Returns only the bytes the chip produced; the length varies per
    /// register and may be less than 64.
    ///
    /// # Errors
    /// * `Transport` - if the transport fails
    /// * `RegisterUnsupported` - if the chip rejects the register or
    ///   returns no data
    #[maybe_async]
    pub async fn read_register(&mut self, reg: u8) -> Result<RegisterBuf> {
        let mut buf = [0u8; MAX_REGISTER_SIZE];
        let len = self
            .transport
            .read_register(self.address, reg, &mut buf)
            .await?;
        if len == 0 {
            return Err(Error::RegisterUnsupported { reg });
        }

        let mut out = RegisterBuf::new();
        // Cannot fail: the slice is bounded by the buffer capacity
        let _ = out.extend_from_slice(&buf[..len.min(MAX_REGISTER_SIZE)]);
        Ok(out)
    }

    /// Write a register
    ///
    /// # Errors
    /// * `PayloadTooLarge` - if `data` is longer than 64 bytes
    /// * `Transport` / `RegisterUnsupported` - as for reads
    #[maybe_async]
    pub async fn write_register(&mut self, reg: u8, data: &[u8]) -> Result<()> {
        if data.len() > MAX_REGISTER_SIZE {
            return Err(Error::PayloadTooLarge { len: data.len() });
        }
        self.transport
            .write_register(self.address, reg, data)
            .await
    }

    /// Run a 4CC command with the default poll budget
    ///
    /// See [`run_command_with_timings`](Self::run_command_with_timings).
    #[maybe_async]
    pub async fn run_command(
        &mut self,
        cmd: FourCc,
        input: &[u8; COMMAND_IO_SIZE],
    ) -> Result<[u8; COMMAND_IO_SIZE]> {
        let timings = self.config.timings;
        self.run_command_with_timings(cmd, input, timings).await
    }

    /// Run a 4CC command and return its 16-byte output
    ///
    /// The input is written to DATA1, the command is issued, and CMD1 is
    /// polled until the chip clears it. DATA1 then holds the task status in
    /// the low nibble of byte 0 followed by the output.
    ///
    /// # Errors
    /// * `CommandTimeout` - if CMD1 is not cleared within the poll budget
    /// * `CommandUnrecognized` - if the chip answers `!CMD`
    /// * `CommandError` - if the task status is nonzero
    #[maybe_async]
    pub async fn run_command_with_timings(
        &mut self,
        cmd: FourCc,
        input: &[u8; COMMAND_IO_SIZE],
        timings: CommandTimings,
    ) -> Result<[u8; COMMAND_IO_SIZE]> {
        log::trace!("TPS 0x{:X}: command '{}' input {:02X?}", self.address, cmd, input);

        self.write_register(registers::DATA1, input).await?;
        self.transport.command(self.address, cmd.raw()).await?;
        self.wait_command(cmd, timings).await?;

        let data = self.read_register(registers::DATA1).await?;
        let status = data[0] & STATUS_MASK;
        if status != TASK_SUCCESS {
            log::debug!(
                "TPS 0x{:X}: command '{}' completed with status 0x{:X}",
                self.address,
                cmd,
                status
            );
            return Err(Error::CommandError { cmd, status });
        }

        let mut output = [0u8; COMMAND_IO_SIZE];
        let payload = &data[1..];
        let len = payload.len().min(COMMAND_IO_SIZE);
        output[..len].copy_from_slice(&payload[..len]);
        Ok(output)
    }

    /// Poll CMD1 until the outstanding command completes
    #[maybe_async]
    async fn wait_command(&mut self, cmd: FourCc, timings: CommandTimings) -> Result<()> {
        for _ in 0..timings.max_polls() {
            let cmd1 = self.read_register(registers::CMD1).await?;
            if cmd1.iter().all(|&b| b == 0) {
                return Ok(());
            }
            if cmd1.starts_with(&commands::CMD_REJECTED) {
                return Err(Error::CommandUnrecognized { cmd });
            }
            if timings.poll_delay_us > 0 {
                self.transport.delay_us(timings.poll_delay_us).await;
            }
        }

        log::warn!("TPS 0x{:X}: command '{}' timed out", self.address, cmd);
        Err(Error::CommandTimeout { cmd })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_polls() {
        assert_eq!(CommandTimings::DEFAULT.max_polls(), 1000);
        assert_eq!(CommandTimings::ERASE.max_polls(), 500);
        let zero_delay = CommandTimings {
            poll_delay_us: 0,
            timeout_us: 20,
        };
        assert_eq!(zero_delay.max_polls(), 20);
        let tiny = CommandTimings {
            poll_delay_us: 100,
            timeout_us: 10,
        };
        assert_eq!(tiny.max_polls(), 1);
    }

    #[test]
    fn test_chunk_size_clamped() {
        let mut config = DeviceConfig::default();
        assert_eq!(config.chunk_size(), 16);
        config.write_chunk_size = 64;
        assert_eq!(config.chunk_size(), 16);
        config.write_chunk_size = 0;
        assert_eq!(config.chunk_size(), 1);
        config.write_chunk_size = 8;
        assert_eq!(config.chunk_size(), 8);
    }
}
