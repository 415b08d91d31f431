//! tbpatch-dummy - In-memory TPS6598x emulator for testing
//!
//! This crate provides a simulated HPM register transport with one TPS6598x
//! behind it. The chip has a register file, executes the flash 4CC
//! commands against an in-memory NOR array, and takes a configurable number
//! of polls to finish each command. Faults can be injected to exercise the
//! error paths of the flash protocol and the patch engine.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use tbpatch_core::error::{Error, Result, TransportFault};
use tbpatch_core::hpm::RegisterTransport;
use tbpatch_core::tps::commands::{self, FourCc, COMMAND_IO_SIZE, SECTOR_SIZE};
use tbpatch_core::tps::registers::{self, MAX_REGISTER_SIZE};

/// Status code returned by the HPM binding when no chip answers
pub const NO_DEVICE: i32 = 0xE000_02C0_u32 as i32;

/// Task status for an invalid flash address
pub const STATUS_INVALID_ADDRESS: u8 = 0x5;

/// Task status for a flash erase/write error
pub const STATUS_FLASH_ERROR: u8 = 0x4;

/// Configuration for the simulated chip
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Bus address the chip answers on
    pub address: u64,
    /// Flash size in bytes
    pub flash_size: usize,
    /// Base address of each flash region, indexed by region number
    pub regions: Vec<u32>,
    /// Polls of CMD1 before a command completes
    pub busy_polls: u32,
    /// Vendor ID register contents
    pub vendor_id: u32,
    /// Device ID register contents
    pub device_id: u32,
    /// Unique ID register contents
    pub uid: [u8; 16],
    /// Version register contents (BCD)
    pub version: u32,
    /// Build register contents
    pub build: String,
    /// Device info register contents
    pub device_info: String,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            address: 0x38,
            flash_size: 64 * 1024,
            regions: vec![0x0000, 0x8000],
            busy_polls: 1,
            vendor_id: 0x0451,
            device_id: 0x0065_5983,
            uid: [
                0x3C, 0x1F, 0x00, 0x42, 0x9E, 0x10, 0x4B, 0x7A, 0x81, 0x22, 0x5D, 0x0C, 0x19, 0x77,
                0xA4, 0xE0,
            ],
            version: 0x0001_1203,
            build: String::from("TPS65983 HW0012 FW0001.12.03"),
            device_info: String::from("TPS6598x ACE1"),
        }
    }
}

/// One-shot command fault
#[derive(Debug, Clone, Copy)]
struct CommandFault {
    cmd: FourCc,
    /// Occurrence of `cmd` (1-based, counted from injection) that fails
    nth: u32,
    status: u8,
}

/// Simulated HPM transport with one TPS6598x
pub struct DummyHpm {
    config: DummyConfig,
    flash: Vec<u8>,
    cmd1: [u8; 4],
    data1: Vec<u8>,
    pending: Option<(FourCc, u32)>,
    addr_ptr: u32,
    log: Vec<FourCc>,
    counts: BTreeMap<u32, u32>,
    faults: Vec<CommandFault>,
    corrupt_writes: Vec<u32>,
    hang: Option<FourCc>,
    transport_fault: Option<i32>,
    unsupported: Vec<u8>,
    polls: u64,
    delayed_us: u64,
}

impl DummyHpm {
    /// Create a chip with erased flash
    pub fn new(config: DummyConfig) -> Self {
        let flash = vec![0xFF; config.flash_size];
        Self {
            config,
            flash,
            cmd1: [0; 4],
            data1: vec![0; MAX_REGISTER_SIZE],
            pending: None,
            addr_ptr: 0,
            log: Vec::new(),
            counts: BTreeMap::new(),
            faults: Vec::new(),
            corrupt_writes: Vec::new(),
            hang: None,
            transport_fault: None,
            unsupported: Vec::new(),
            polls: 0,
            delayed_us: 0,
        }
    }

    /// Create a chip with default configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Create a chip with `data` programmed at absolute address `addr`
    pub fn with_data(config: DummyConfig, addr: u32, data: &[u8]) -> Self {
        let mut hpm = Self::new(config);
        hpm.load(addr, data);
        hpm
    }

    /// Overwrite flash at absolute address `addr`, bypassing the protocol
    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let addr = addr as usize;
        self.flash[addr..addr + data.len()].copy_from_slice(data);
    }

    /// Flash contents
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Configuration of the chip
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Every command issued so far, in order
    pub fn commands(&self) -> &[FourCc] {
        &self.log
    }

    /// Number of times `cmd` was issued
    pub fn command_count(&self, cmd: FourCc) -> usize {
        self.log.iter().filter(|&&c| c == cmd).count()
    }

    /// Number of erase and write commands issued
    pub fn modifying_commands(&self) -> usize {
        self.command_count(commands::FLASH_ERASE)
            + self.command_count(commands::FLASH_ERASE_REGION)
            + self.command_count(commands::FLASH_WRITE)
    }

    /// Forget the command log
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Number of CMD1 polls served
    pub fn polls(&self) -> u64 {
        self.polls
    }

    /// Total delay requested through the transport
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }

    /// Make the `nth` next occurrence of `cmd` complete with `status`
    ///
    /// The failing command has no effect on the flash.
    pub fn fail_command(&mut self, cmd: FourCc, nth: u32, status: u8) {
        let seen = self.counts.get(&cmd.raw()).copied().unwrap_or(0);
        self.faults.push(CommandFault {
            cmd,
            nth: seen + nth,
            status,
        });
    }

    /// Make the `nth` next `FLwd` store its first byte with bit 0 flipped
    pub fn corrupt_write(&mut self, nth: u32) {
        let seen = self
            .counts
            .get(&commands::FLASH_WRITE.raw())
            .copied()
            .unwrap_or(0);
        self.corrupt_writes.push(seen + nth);
    }

    /// Never complete `cmd`; CMD1 stays busy
    pub fn hang_command(&mut self, cmd: FourCc) {
        self.hang = Some(cmd);
    }

    /// Fail every following register access and command with `code`
    pub fn fail_transport(&mut self, code: i32) {
        self.transport_fault = Some(code);
    }

    /// Clear all injected faults
    pub fn clear_faults(&mut self) {
        self.faults.clear();
        self.corrupt_writes.clear();
        self.hang = None;
        self.transport_fault = None;
    }

    /// Report `reg` as unsupported
    pub fn set_unsupported(&mut self, reg: u8) {
        self.unsupported.push(reg);
    }

    fn check_bus(&self, chip: u64) -> Result<()> {
        if let Some(code) = self.transport_fault {
            return Err(TransportFault::new(code).into());
        }
        if chip != self.config.address {
            return Err(TransportFault::new(NO_DEVICE).into());
        }
        Ok(())
    }

    fn complete(&mut self, status: u8, output: &[u8; COMMAND_IO_SIZE]) {
        self.cmd1 = [0; 4];
        self.data1.clear();
        self.data1.push(status);
        self.data1.extend_from_slice(output);
    }

    fn input(&self) -> [u8; COMMAND_IO_SIZE] {
        let mut input = [0u8; COMMAND_IO_SIZE];
        let len = self.data1.len().min(COMMAND_IO_SIZE);
        input[..len].copy_from_slice(&self.data1[..len]);
        input
    }

    fn span(&self, addr: u32, len: u32) -> Option<core::ops::Range<usize>> {
        let start = addr as usize;
        let end = start.checked_add(len as usize)?;
        (end <= self.flash.len()).then_some(start..end)
    }

    /// Execute a command whose busy period has elapsed
    fn execute(&mut self, cmd: FourCc) {
        let occurrence = {
            let count = self.counts.entry(cmd.raw()).or_insert(0);
            *count += 1;
            *count
        };
        let input = self.input();
        let mut output = [0u8; COMMAND_IO_SIZE];

        if let Some(pos) = self
            .faults
            .iter()
            .position(|f| f.cmd == cmd && f.nth == occurrence)
        {
            let fault = self.faults.remove(pos);
            log::debug!("dummy: injecting status 0x{:X} for '{}'", fault.status, cmd);
            // A failed write still advances the address pointer
            if cmd == commands::FLASH_WRITE {
                self.addr_ptr = self.addr_ptr.saturating_add(COMMAND_IO_SIZE as u32);
            }
            self.complete(fault.status, &output);
            return;
        }

        let le = |b: &[u8]| u32::from_le_bytes([b[0], b[1], b[2], b[3]]);

        let status = match cmd {
            commands::FLASH_ACTIVE_REGION => match self.config.regions.get(input[0] as usize) {
                Some(base) => {
                    output[..4].copy_from_slice(&base.to_le_bytes());
                    commands::TASK_SUCCESS
                }
                None => STATUS_INVALID_ADDRESS,
            },
            commands::FLASH_ADDRESS_START => {
                let addr = le(&input);
                if (addr as usize) < self.flash.len() {
                    self.addr_ptr = addr;
                    commands::TASK_SUCCESS
                } else {
                    STATUS_INVALID_ADDRESS
                }
            }
            commands::FLASH_ERASE => match self.span(self.addr_ptr, le(&input)) {
                Some(range) => {
                    self.flash[range].fill(0xFF);
                    commands::TASK_SUCCESS
                }
                None => STATUS_INVALID_ADDRESS,
            },
            commands::FLASH_ERASE_REGION => {
                let addr = le(&input);
                let len = SECTOR_SIZE * input[4] as u32;
                match self.span(addr, len) {
                    Some(range) if addr % SECTOR_SIZE == 0 => {
                        self.flash[range].fill(0xFF);
                        commands::TASK_SUCCESS
                    }
                    _ => STATUS_INVALID_ADDRESS,
                }
            }
            commands::FLASH_WRITE => {
                let start = self.addr_ptr as usize;
                if start >= self.flash.len() {
                    STATUS_INVALID_ADDRESS
                } else {
                    let end = (start + COMMAND_IO_SIZE).min(self.flash.len());
                    // Programming can only clear bits
                    for (cell, byte) in self.flash[start..end].iter_mut().zip(input.iter()) {
                        *cell &= byte;
                    }
                    if let Some(pos) = self.corrupt_writes.iter().position(|&n| n == occurrence) {
                        self.corrupt_writes.remove(pos);
                        self.flash[start] ^= 0x01;
                    }
                    self.addr_ptr = end as u32;
                    commands::TASK_SUCCESS
                }
            }
            commands::FLASH_READ => {
                let start = le(&input) as usize;
                if start >= self.flash.len() {
                    STATUS_INVALID_ADDRESS
                } else {
                    let end = (start + COMMAND_IO_SIZE).min(self.flash.len());
                    output.fill(0xFF);
                    output[..end - start].copy_from_slice(&self.flash[start..end]);
                    commands::TASK_SUCCESS
                }
            }
            commands::FLASH_VERIFY => {
                if self.config.regions.contains(&le(&input)) {
                    commands::TASK_SUCCESS
                } else {
                    STATUS_INVALID_ADDRESS
                }
            }
            _ => {
                log::debug!("dummy: rejecting unknown command '{}'", cmd);
                self.cmd1 = commands::CMD_REJECTED;
                return;
            }
        };

        self.complete(status, &output);
    }
}

impl RegisterTransport for DummyHpm {
    fn read_register(&mut self, chip: u64, reg: u8, buf: &mut [u8]) -> Result<usize> {
        self.check_bus(chip)?;
        if self.unsupported.contains(&reg) {
            return Err(Error::RegisterUnsupported { reg });
        }

        let mut value = [0u8; MAX_REGISTER_SIZE];
        let len = match reg {
            registers::VID => {
                value[..4].copy_from_slice(&self.config.vendor_id.to_le_bytes());
                4
            }
            registers::DID => {
                value[..4].copy_from_slice(&self.config.device_id.to_le_bytes());
                4
            }
            registers::UID => {
                value[..16].copy_from_slice(&self.config.uid);
                16
            }
            registers::VERSION => {
                value[..4].copy_from_slice(&self.config.version.to_le_bytes());
                4
            }
            registers::BUILD | registers::DEV_INFO => {
                let text = if reg == registers::BUILD {
                    &self.config.build
                } else {
                    &self.config.device_info
                };
                let len = text.len().min(MAX_REGISTER_SIZE);
                value[..len].copy_from_slice(&text.as_bytes()[..len]);
                len
            }
            registers::CMD1 => {
                self.polls += 1;
                if let Some((cmd, remaining)) = self.pending {
                    if self.hang != Some(cmd) {
                        if remaining <= 1 {
                            self.pending = None;
                            self.execute(cmd);
                        } else {
                            self.pending = Some((cmd, remaining - 1));
                        }
                    }
                }
                value[..4].copy_from_slice(&self.cmd1);
                4
            }
            registers::DATA1 => {
                let len = self.data1.len().min(MAX_REGISTER_SIZE);
                value[..len].copy_from_slice(&self.data1[..len]);
                len
            }
            _ => return Err(Error::RegisterUnsupported { reg }),
        };

        let n = len.min(buf.len());
        buf[..n].copy_from_slice(&value[..n]);
        Ok(n)
    }

    fn write_register(&mut self, chip: u64, reg: u8, data: &[u8]) -> Result<()> {
        self.check_bus(chip)?;
        match reg {
            registers::DATA1 => {
                self.data1.clear();
                self.data1.extend_from_slice(data);
                Ok(())
            }
            _ => Err(Error::RegisterUnsupported { reg }),
        }
    }

    fn command(&mut self, chip: u64, cmd: u32) -> Result<()> {
        self.check_bus(chip)?;
        let cmd = FourCc::from_raw(cmd);
        self.log.push(cmd);
        self.cmd1 = cmd.to_bytes();
        if self.config.busy_polls == 0 && self.hang != Some(cmd) {
            self.execute(cmd);
        } else {
            self.pending = Some((cmd, self.config.busy_polls));
        }
        Ok(())
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += us as u64;
    }
}
