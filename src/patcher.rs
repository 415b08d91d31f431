//! Configured device plus engine

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tbpatch_core::engine::{BatchReport, EngineConfig, PatchEngine, PatchProgress};
use tbpatch_core::hpm::RegisterTransport;
use tbpatch_core::patch::{Patch, PatchSet};
use tbpatch_core::tps::{DeviceIdentity, Tps6598xDevice};

use crate::config::PatcherConfig;
use crate::error::{PatcherError, Result};
use crate::report;

/// Patches one controller according to a [`PatcherConfig`]
pub struct Patcher<T: RegisterTransport> {
    device: Tps6598xDevice<T>,
    engine: EngineConfig,
    cancel: Arc<AtomicBool>,
}

impl<T: RegisterTransport> Patcher<T> {
    /// Open the controller behind `transport`
    pub fn new(transport: T, config: &PatcherConfig) -> Self {
        Self {
            device: Tps6598xDevice::with_config(transport, config.address, config.device),
            engine: config.engine,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The underlying device
    pub fn device(&self) -> &Tps6598xDevice<T> {
        &self.device
    }

    /// The underlying device, mutably
    pub fn device_mut(&mut self) -> &mut Tps6598xDevice<T> {
        &mut self.device
    }

    /// Release the device
    pub fn into_device(self) -> Tps6598xDevice<T> {
        self.device
    }

    /// Engine settings used by [`run`](Self::run)
    pub fn engine_config(&self) -> &EngineConfig {
        &self.engine
    }

    /// Flag that cancels a running batch before its next region
    ///
    /// The flag stays set once raised; later batches are cancelled too until
    /// it is cleared.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Identification of the controller, loaded on first use
    pub fn identity(&mut self) -> Result<DeviceIdentity> {
        Ok(self.device.ensure_loaded()?.clone())
    }

    /// Run the engine over `sets` and log the outcome of every region
    pub fn run<P: PatchProgress>(&mut self, sets: &mut [PatchSet], progress: &mut P) -> BatchReport {
        let report = PatchEngine::new(&mut self.device, self.engine)
            .with_cancel(&self.cancel)
            .run(sets, progress);
        report::log_report(&report);
        report
    }

    /// Group `patches` into regions, run them, and fail unless all succeed
    ///
    /// # Errors
    /// * `Aborted` - if a transport failure stopped the batch
    /// * `Incomplete` - if any region did not reach its target content
    pub fn apply<P: PatchProgress>(
        &mut self,
        patches: impl IntoIterator<Item = Patch>,
        progress: &mut P,
    ) -> Result<BatchReport> {
        let mut sets = PatchSet::group(patches);
        let report = self.run(&mut sets, progress);
        check_report(&report)?;
        Ok(report)
    }
}

/// Turn an unsuccessful batch into an error
pub fn check_report(report: &BatchReport) -> Result<()> {
    if let Some(error) = report.aborted {
        return Err(PatcherError::Aborted(error));
    }
    let unfinished = report.unfinished().count();
    if unfinished > 0 {
        return Err(PatcherError::Incomplete {
            unfinished,
            total: report.regions.len(),
        });
    }
    Ok(())
}
