//! Progress reporting for batch runs

use super::{BatchReport, RegionOutcome};
use crate::error::Error;
use crate::patch::DataType;

/// Progress callback trait for batch runs
pub trait PatchProgress {
    /// Called once before the first region
    fn batch_started(&mut self, regions: usize);

    /// Called when a region starts processing
    fn region_started(&mut self, index: usize, offset: u32, size: u32);

    /// Called after the region's device data has been classified
    fn region_classified(&mut self, index: usize, data_type: DataType);

    /// Called when an attempt fails and will be retried
    fn attempt_failed(&mut self, index: usize, attempt: u32, error: &Error);

    /// Called when a region is done
    fn region_finished(&mut self, index: usize, outcome: &RegionOutcome);

    /// Called when the batch is done
    fn complete(&mut self, report: &BatchReport);
}

/// A no-op progress reporter
pub struct NoProgress;

impl PatchProgress for NoProgress {
    fn batch_started(&mut self, _regions: usize) {}
    fn region_started(&mut self, _index: usize, _offset: u32, _size: u32) {}
    fn region_classified(&mut self, _index: usize, _data_type: DataType) {}
    fn attempt_failed(&mut self, _index: usize, _attempt: u32, _error: &Error) {}
    fn region_finished(&mut self, _index: usize, _outcome: &RegionOutcome) {}
    fn complete(&mut self, _report: &BatchReport) {}
}
