//! Host processor manager (HPM) register transport
//!
//! The TPS6598x is reached through a vendor HPM driver that brokers
//! register access over the management bus. This module defines the
//! capability the device layer needs from any such binding.

mod traits;

pub use traits::*;
