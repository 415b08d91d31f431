//! Per-region outcomes and batch report

use alloc::vec::Vec;
use core::fmt;

use crate::error::Error;
use crate::patch::DataType;

/// What happened to one region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionOutcome {
    /// Device already held the target content; nothing was written
    AlreadyApplied,
    /// Region was erased, written and verified
    Applied {
        /// Attempts used, including the successful one
        attempts: u32,
    },
    /// Dry run: the region would have been written
    WouldApply,
    /// Device data matched neither reference; left untouched
    UnexpectedContent,
    /// Region could not be committed
    Failed {
        /// Last error seen
        error: Error,
        /// Attempts used
        attempts: u32,
    },
    /// Not processed because the batch was aborted
    Skipped,
    /// Not processed because the batch was cancelled
    Cancelled,
}

impl RegionOutcome {
    /// Whether the region now holds the target content
    pub fn is_success(&self) -> bool {
        matches!(self, Self::AlreadyApplied | Self::Applied { .. })
    }

    /// The error behind an unsuccessful outcome, if any
    pub fn error(&self) -> Option<Error> {
        match self {
            Self::UnexpectedContent => Some(Error::UnexpectedContent),
            Self::Failed { error, .. } => Some(*error),
            _ => None,
        }
    }
}

impl fmt::Display for RegionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyApplied => write!(f, "already applied"),
            Self::Applied { attempts: 1 } => write!(f, "applied"),
            Self::Applied { attempts } => write!(f, "applied after {} attempts", attempts),
            Self::WouldApply => write!(f, "would apply"),
            Self::UnexpectedContent => write!(f, "unexpected content"),
            Self::Failed { error, attempts } => {
                write!(f, "failed after {} attempt(s): {}", attempts, error)
            }
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Outcome of one region in a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionReport {
    /// Position of the patch set in the batch
    pub index: usize,
    /// Region offset
    pub offset: u32,
    /// Region size
    pub size: u32,
    /// Classification of the data last recorded for the region
    pub data_type: DataType,
    /// What happened
    pub outcome: RegionOutcome,
}

/// Result of a batch run
///
/// There is no multi-region transaction: regions reported as applied stay
/// committed whatever happens to later regions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One entry per patch set, in batch order
    pub regions: Vec<RegionReport>,
    /// Transport error that stopped the batch early
    pub aborted: Option<Error>,
}

impl BatchReport {
    /// Whether every region holds its target content
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none() && self.regions.iter().all(|r| r.outcome.is_success())
    }

    /// Number of regions that hold their target content
    pub fn succeeded(&self) -> usize {
        self.regions.iter().filter(|r| r.outcome.is_success()).count()
    }

    /// Regions that did not reach their target content
    pub fn unfinished(&self) -> impl Iterator<Item = &RegionReport> {
        self.regions.iter().filter(|r| !r.outcome.is_success())
    }

    /// Number of regions written in this run
    pub fn written(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| matches!(r.outcome, RegionOutcome::Applied { .. }))
            .count()
    }
}
