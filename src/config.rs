//! TOML patcher configuration
//!
//! ```toml
//! [chip]
//! address = "0x38"
//!
//! [device]
//! region = 0
//! write_chunk_size = 16
//! poll_delay_us = 1000
//! timeout_us = 1000000
//! erase_poll_delay_us = 10000
//! erase_timeout_us = 5000000
//!
//! [engine]
//! max_attempts = 3
//! direction = "install"
//! dry_run = false
//! verify_image = false
//! ```
//!
//! Every section is optional except `[chip]`. Numeric device fields accept
//! integers or hex strings.

use std::fs;
use std::path::Path;

use tbpatch_core::engine::EngineConfig;
use tbpatch_core::tps::commands::COMMAND_IO_SIZE;
use tbpatch_core::tps::{CommandTimings, DeviceConfig};

use crate::error::ConfigError;

/// Everything needed to open a device and run the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatcherConfig {
    /// Bus address of the controller
    pub address: u64,
    /// Device layer settings
    pub device: DeviceConfig,
    /// Engine settings
    pub engine: EngineConfig,
}

/// TOML file structure
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPatcherFile {
    chip: TomlChip,
    #[serde(default)]
    device: TomlDevice,
    #[serde(default)]
    engine: EngineConfig,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlChip {
    #[serde(deserialize_with = "deserialize_hex_u64")]
    address: u64,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlDevice {
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    region: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    write_chunk_size: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    poll_delay_us: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    timeout_us: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    erase_poll_delay_us: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u64")]
    erase_timeout_us: Option<u64>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum HexOrInt {
    Int(u64),
    Str(String),
}

impl HexOrInt {
    fn value(self) -> Result<u64, String> {
        match self {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Str(s) => parse_number(&s),
        }
    }
}

/// Deserialize a u64 that can be hex (0x...) or decimal
fn deserialize_hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    HexOrInt::deserialize(deserializer)?
        .value()
        .map_err(serde::de::Error::custom)
}

fn deserialize_opt_hex_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_hex_u64(deserializer).map(Some)
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

fn to_u32(name: &str, value: u64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|_| ConfigError::Invalid(format!("{} out of range: {}", name, value)))
}

fn timings(
    base: CommandTimings,
    poll_delay_us: Option<u64>,
    timeout_us: Option<u64>,
    prefix: &str,
) -> Result<CommandTimings, ConfigError> {
    let timings = CommandTimings {
        poll_delay_us: match poll_delay_us {
            Some(v) => to_u32(&format!("{}poll_delay_us", prefix), v)?,
            None => base.poll_delay_us,
        },
        timeout_us: match timeout_us {
            Some(v) => to_u32(&format!("{}timeout_us", prefix), v)?,
            None => base.timeout_us,
        },
    };
    if timings.timeout_us == 0 {
        return Err(ConfigError::Invalid(format!("{}timeout_us must be nonzero", prefix)));
    }
    if timings.poll_delay_us > timings.timeout_us {
        return Err(ConfigError::Invalid(format!(
            "{}poll_delay_us ({}) exceeds {}timeout_us ({})",
            prefix, timings.poll_delay_us, prefix, timings.timeout_us
        )));
    }
    Ok(timings)
}

impl TomlDevice {
    fn into_config(self) -> Result<DeviceConfig, ConfigError> {
        let defaults = DeviceConfig::default();

        let region = match self.region {
            Some(v) => u8::try_from(v)
                .map_err(|_| ConfigError::Invalid(format!("region out of range: {}", v)))?,
            None => defaults.region,
        };

        let write_chunk_size = match self.write_chunk_size {
            Some(v) if (1..=COMMAND_IO_SIZE as u64).contains(&v) => v as usize,
            Some(v) => {
                return Err(ConfigError::Invalid(format!(
                    "write_chunk_size must be 1..={}, got {}",
                    COMMAND_IO_SIZE, v
                )))
            }
            None => defaults.write_chunk_size,
        };

        Ok(DeviceConfig {
            write_chunk_size,
            region,
            timings: timings(defaults.timings, self.poll_delay_us, self.timeout_us, "")?,
            erase_timings: timings(
                defaults.erase_timings,
                self.erase_poll_delay_us,
                self.erase_timeout_us,
                "erase_",
            )?,
        })
    }
}

impl PatcherConfig {
    /// Configuration with defaults for the chip at `address`
    pub fn new(address: u64) -> Self {
        Self {
            address,
            device: DeviceConfig::default(),
            engine: EngineConfig::default(),
        }
    }

    /// Load a configuration from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: TomlPatcherFile = toml::from_str(content)?;

        if file.engine.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }

        Ok(Self {
            address: file.chip.address,
            device: file.device.into_config()?,
            engine: file.engine,
        })
    }
}
