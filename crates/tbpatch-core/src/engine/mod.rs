//! Patch engine
//!
//! The engine walks a batch of [`PatchSet`]s in order. For each region it
//! reads the device, classifies the data, and either skips the region
//! (already correct), commits the target content with a bounded number of
//! erase/write/verify attempts, or reports a conflict when the data matches
//! neither reference.
//!
//! Regions are processed strictly one after another. A region is never
//! interrupted between erase and verify; cancellation is only observed
//! between regions.

mod config;
mod outcome;
mod progress;

pub use config::{EngineConfig, PatchDirection, DEFAULT_MAX_ATTEMPTS};
pub use outcome::{BatchReport, RegionOutcome, RegionReport};
pub use progress::{NoProgress, PatchProgress};

use core::sync::atomic::{AtomicBool, Ordering};

use maybe_async::maybe_async;

use crate::error::Error;
use crate::hpm::RegisterTransport;
use crate::patch::{DataType, PatchSet};
use crate::tps::Tps6598xDevice;

/// What the engine does with a classified region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionAction {
    /// Device already holds the target content
    Skip,
    /// Device holds the source content; commit the target
    Write,
    /// Device holds something else; leave it alone
    Conflict,
}

impl RegionAction {
    /// Decide what to do with a region classified as `data_type`
    pub fn plan(data_type: DataType, direction: PatchDirection) -> Self {
        match (direction, data_type) {
            (_, DataType::MatchesBoth) => Self::Skip,
            (_, DataType::Unknown) => Self::Conflict,
            (PatchDirection::Install, DataType::MatchesReplace) => Self::Skip,
            (PatchDirection::Install, DataType::MatchesOriginal) => Self::Write,
            (PatchDirection::Uninstall, DataType::MatchesOriginal) => Self::Skip,
            (PatchDirection::Uninstall, DataType::MatchesReplace) => Self::Write,
        }
    }
}

/// Result of processing one region
enum Step {
    Done(RegionOutcome),
    /// Transport failure: the batch cannot continue
    Abort(RegionOutcome, Error),
}

/// Drives patch sets onto one device
pub struct PatchEngine<'a, T: RegisterTransport> {
    device: &'a mut Tps6598xDevice<T>,
    config: EngineConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, T: RegisterTransport> PatchEngine<'a, T> {
    /// Create an engine for `device`
    pub fn new(device: &'a mut Tps6598xDevice<T>, config: EngineConfig) -> Self {
        Self {
            device,
            config,
            cancel: None,
        }
    }

    /// Stop before the next region once `flag` is set
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Process every patch set in order and report each region's outcome
    ///
    /// A conflict or failure in one region does not stop the batch. Only a
    /// transport failure does; the remaining regions are then reported as
    /// skipped.
    #[maybe_async]
    pub async fn run<P: PatchProgress>(
        &mut self,
        sets: &mut [PatchSet],
        progress: &mut P,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        progress.batch_started(sets.len());

        log::info!(
            "TPS 0x{:X}: {} {} region(s){}",
            self.device.address(),
            self.config.direction,
            sets.len(),
            if self.config.dry_run { " (dry run)" } else { "" }
        );

        for (index, set) in sets.iter_mut().enumerate() {
            let outcome = if report.aborted.is_some() {
                RegionOutcome::Skipped
            } else if self.cancelled() {
                log::info!("Batch cancelled before region {}", index);
                RegionOutcome::Cancelled
            } else {
                progress.region_started(index, set.offset(), set.size());
                match self.process_region(index, set, progress).await {
                    Step::Done(outcome) => outcome,
                    Step::Abort(outcome, error) => {
                        log::error!("Aborting batch: {}", error);
                        report.aborted = Some(error);
                        outcome
                    }
                }
            };

            progress.region_finished(index, &outcome);
            report.regions.push(RegionReport {
                index,
                offset: set.offset(),
                size: set.size(),
                data_type: set.data_type(),
                outcome,
            });
        }

        progress.complete(&report);
        report
    }

    /// Read, classify and if needed commit one region
    #[maybe_async]
    async fn process_region<P: PatchProgress>(
        &mut self,
        index: usize,
        set: &mut PatchSet,
        progress: &mut P,
    ) -> Step {
        if self.config.direction == PatchDirection::Uninstall && !set.has_originals() {
            log::error!(
                "Region 0x{:08X}+0x{:X}: cannot uninstall, original bytes unknown",
                set.offset(),
                set.size()
            );
            return Step::Done(RegionOutcome::Failed {
                error: Error::InvalidPatch,
                attempts: 0,
            });
        }

        // Read the current contents, retrying command-level failures
        let mut attempt = 0;
        let data = loop {
            attempt += 1;
            match self
                .device
                .eeprom_read_vec(set.offset(), set.size() as usize)
                .await
            {
                Ok(data) => break data,
                Err(e) => {
                    if let Some(step) = self.give_up(index, attempt, e, progress) {
                        return step;
                    }
                }
            }
        };

        let data_type = match set.record_device_data(data) {
            Ok(data_type) => data_type,
            Err(error) => return Step::Done(RegionOutcome::Failed { error, attempts: attempt }),
        };
        progress.region_classified(index, data_type);

        match RegionAction::plan(data_type, self.config.direction) {
            RegionAction::Skip => {
                log::info!(
                    "Region 0x{:08X}+0x{:X} already {}",
                    set.offset(),
                    set.size(),
                    data_type
                );
                return Step::Done(RegionOutcome::AlreadyApplied);
            }
            RegionAction::Conflict => {
                log::warn!(
                    "Region 0x{:08X}+0x{:X}: {}",
                    set.offset(),
                    set.size(),
                    Error::UnexpectedContent
                );
                return Step::Done(RegionOutcome::UnexpectedContent);
            }
            RegionAction::Write if self.config.dry_run => {
                log::info!(
                    "Region 0x{:08X}+0x{:X} would be written",
                    set.offset(),
                    set.size()
                );
                return Step::Done(RegionOutcome::WouldApply);
            }
            RegionAction::Write => {}
        }

        let target = set.patch_data_with_original(self.config.direction.wants_original());

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.commit(set.offset(), &target).await {
                Ok(()) => break,
                Err(e) => {
                    if let Some(step) = self.give_up(index, attempt, e, progress) {
                        return step;
                    }
                }
            }
        }

        log::info!(
            "Region 0x{:08X}+0x{:X} written and verified",
            set.offset(),
            set.size()
        );
        match set.record_device_data(target) {
            Ok(_) => Step::Done(RegionOutcome::Applied { attempts: attempt }),
            Err(error) => Step::Done(RegionOutcome::Failed {
                error,
                attempts: attempt,
            }),
        }
    }

    /// Erase, write and verify one region
    #[maybe_async]
    async fn commit(&mut self, offset: u32, target: &[u8]) -> Result<(), Error> {
        self.device.eeprom_write(offset, target).await?;
        if self.config.verify_image {
            self.device.eeprom_verify_image().await?;
        }
        Ok(())
    }

    /// Decide whether a failed attempt ends the region
    fn give_up<P: PatchProgress>(
        &self,
        index: usize,
        attempt: u32,
        error: Error,
        progress: &mut P,
    ) -> Option<Step> {
        let failed = RegionOutcome::Failed {
            error,
            attempts: attempt,
        };
        if error.is_transport() {
            return Some(Step::Abort(failed, error));
        }
        if !error.is_retryable() || attempt >= self.config.attempts() {
            log::error!("Region {}: giving up after {} attempt(s): {}", index, attempt, error);
            return Some(Step::Done(failed));
        }

        log::warn!("Region {}: attempt {} failed: {}, retrying", index, attempt, error);
        progress.attempt_failed(index, attempt, &error);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_install() {
        let d = PatchDirection::Install;
        assert_eq!(RegionAction::plan(DataType::MatchesOriginal, d), RegionAction::Write);
        assert_eq!(RegionAction::plan(DataType::MatchesReplace, d), RegionAction::Skip);
        assert_eq!(RegionAction::plan(DataType::MatchesBoth, d), RegionAction::Skip);
        assert_eq!(RegionAction::plan(DataType::Unknown, d), RegionAction::Conflict);
    }

    #[test]
    fn test_plan_uninstall() {
        let d = PatchDirection::Uninstall;
        assert_eq!(RegionAction::plan(DataType::MatchesOriginal, d), RegionAction::Skip);
        assert_eq!(RegionAction::plan(DataType::MatchesReplace, d), RegionAction::Write);
        assert_eq!(RegionAction::plan(DataType::MatchesBoth, d), RegionAction::Skip);
        assert_eq!(RegionAction::plan(DataType::Unknown, d), RegionAction::Conflict);
    }

    #[test]
    fn test_outcome_success() {
        assert!(RegionOutcome::AlreadyApplied.is_success());
        assert!(RegionOutcome::Applied { attempts: 2 }.is_success());
        assert!(!RegionOutcome::WouldApply.is_success());
        assert!(!RegionOutcome::Cancelled.is_success());
        assert_eq!(
            RegionOutcome::UnexpectedContent.error(),
            Some(Error::UnexpectedContent)
        );
    }

    #[test]
    fn test_report_completeness() {
        let region = |outcome| RegionReport {
            index: 0,
            offset: 0,
            size: 1,
            data_type: DataType::Unknown,
            outcome,
        };
        let mut report = BatchReport::default();
        report.regions.push(region(RegionOutcome::AlreadyApplied));
        report.regions.push(region(RegionOutcome::Applied { attempts: 1 }));
        assert!(report.is_complete());
        assert_eq!(report.written(), 1);

        report.regions.push(region(RegionOutcome::UnexpectedContent));
        assert!(!report.is_complete());
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.unfinished().count(), 1);
    }

    #[test]
    fn test_retry_classification() {
        assert!(Error::PartialWrite { written: 16 }.is_retryable());
        assert!(Error::VerifyMismatch { offset: 0 }.is_retryable());
        assert!(Error::EraseFailed { status: 4 }.is_retryable());
        assert!(!Error::UnexpectedContent.is_retryable());
        assert!(!Error::InvalidPatch.is_retryable());
        assert!(!Error::Transport(crate::error::TransportFault::new(-1)).is_retryable());
    }
}
