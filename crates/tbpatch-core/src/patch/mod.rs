//! Patch model
//!
//! A [`Patch`] is one immutable byte-range edit. A [`PatchSet`] aggregates
//! the patches covering one contiguous region together with the data last
//! read from the device, and classifies that data as a [`DataType`].

mod set;
mod types;

pub use set::{DataType, PatchSet};
pub use types::Patch;
