//! tbpatch-core - Firmware patching for TPS6598x USB Power-Delivery controllers
//!
//! This crate models byte-range edits to the firmware image held in a
//! TPS6598x flash and sequences the chip commands needed to commit them:
//! select the active region, erase, program and verify.
//!
//! It is `no_std` (with `alloc`) so the same code can run wherever a
//! register transport to the host processor manager (HPM) is available.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error`, serde
//!   derives on configuration types)
//! - `is_sync` - Compile the transport and device layers as blocking code
//!
//! # Example
//!
//! ```ignore
//! use tbpatch_core::engine::{EngineConfig, NoProgress, PatchEngine};
//! use tbpatch_core::patch::{Patch, PatchSet};
//! use tbpatch_core::tps::Tps6598xDevice;
//!
//! let mut set = PatchSet::new(0x100, 4)?;
//! set.queue_patch(Patch::new(0x100, vec![0xDE, 0xAD, 0xBE, 0xEF], vec![0; 4])?)?;
//!
//! let mut device = Tps6598xDevice::new(transport, 0x38);
//! let report = PatchEngine::new(&mut device, EngineConfig::default())
//!     .run(&mut [set], &mut NoProgress);
//! assert!(report.is_complete());
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
// Allow async fn in traits - we use maybe-async for dual sync/async support
#![allow(async_fn_in_trait)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod engine;
pub mod error;
pub mod hpm;
pub mod patch;
pub mod tps;

pub use error::{Error, Result};
