//! Engine configuration

use core::fmt;

/// Default number of erase/write/verify attempts per region
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Which way the patches are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[cfg_attr(feature = "std", serde(rename_all = "lowercase"))]
pub enum PatchDirection {
    /// Install the replacement bytes
    #[default]
    Install,
    /// Restore the original bytes
    Uninstall,
}

impl PatchDirection {
    /// Whether the target content is the patches' original bytes
    pub fn wants_original(&self) -> bool {
        matches!(self, Self::Uninstall)
    }
}

impl fmt::Display for PatchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => f.write_str("install"),
            Self::Uninstall => f.write_str("uninstall"),
        }
    }
}

/// Patch engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "std", derive(serde::Deserialize))]
#[cfg_attr(feature = "std", serde(default, deny_unknown_fields))]
pub struct EngineConfig {
    /// Erase/write/verify attempts per region before giving up
    pub max_attempts: u32,
    /// Install or uninstall the patches
    pub direction: PatchDirection,
    /// Classify regions without erasing or writing anything
    pub dry_run: bool,
    /// Run the chip's image check (`FLvy`) after each committed region
    pub verify_image: bool,
}

impl EngineConfig {
    /// Attempt budget, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            direction: PatchDirection::Install,
            dry_run: false,
            verify_image: false,
        }
    }
}
