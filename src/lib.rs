//! tbpatch - Firmware patcher for TPS6598x USB-PD controllers
//!
//! This crate is the std front end of [`tbpatch_core`]: it loads a TOML
//! configuration, wires a register transport into a device and the patch
//! engine, draws progress with indicatif, and turns the batch report into
//! log lines or an error.
//!
//! # Example
//!
//! ```ignore
//! use tbpatch::{IndicatifProgress, Patcher, PatcherConfig};
//! use tbpatch::patch::Patch;
//!
//! let config = PatcherConfig::from_toml_file("tps.toml")?;
//! let mut patcher = Patcher::new(transport, &config);
//! println!("{:?}", patcher.identity()?.version);
//!
//! let patch = Patch::new(0x1234, vec![0xDE, 0xAD], vec![0xBE, 0xEF])?;
//! patcher.apply([patch], &mut IndicatifProgress::new())?;
//! ```

pub mod config;
pub mod error;
pub mod patcher;
pub mod progress;
pub mod report;

pub use tbpatch_core::{engine, hpm, patch, tps};

pub use config::PatcherConfig;
pub use error::{ConfigError, PatcherError, Result};
pub use patcher::{check_report, Patcher};
pub use progress::IndicatifProgress;
pub use report::{format_report, log_report};
