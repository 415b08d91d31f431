//! Progress reporting with indicatif

use indicatif::{ProgressBar, ProgressStyle};
use tbpatch_core::engine::{BatchReport, PatchProgress, RegionOutcome};
use tbpatch_core::patch::DataType;
use tbpatch_core::Error;

/// Progress reporter drawing one bar over the regions of a batch
pub struct IndicatifProgress {
    bar: Option<ProgressBar>,
    region: Option<(u32, u32)>,
}

impl IndicatifProgress {
    /// Create a reporter; the bar appears when the batch starts
    pub fn new() -> Self {
        Self {
            bar: None,
            region: None,
        }
    }

    fn region_label(&self) -> String {
        match self.region {
            Some((offset, size)) => format!("0x{:08X}+0x{:X}", offset, size),
            None => String::new(),
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchProgress for IndicatifProgress {
    fn batch_started(&mut self, regions: usize) {
        let pb = ProgressBar::new(regions as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} regions {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn region_started(&mut self, _index: usize, offset: u32, size: u32) {
        self.region = Some((offset, size));
        if let Some(pb) = &self.bar {
            pb.set_message(format!("{} reading", self.region_label()));
        }
    }

    fn region_classified(&mut self, _index: usize, data_type: DataType) {
        if let Some(pb) = &self.bar {
            pb.set_message(format!("{} {}", self.region_label(), data_type));
        }
    }

    fn attempt_failed(&mut self, _index: usize, attempt: u32, error: &Error) {
        if let Some(pb) = &self.bar {
            pb.println(format!(
                "{}: attempt {} failed: {}",
                self.region_label(),
                attempt,
                error
            ));
        }
    }

    fn region_finished(&mut self, _index: usize, _outcome: &RegionOutcome) {
        if let Some(pb) = &self.bar {
            pb.inc(1);
        }
        self.region = None;
    }

    fn complete(&mut self, report: &BatchReport) {
        if let Some(pb) = self.bar.take() {
            let message = format!(
                "{} of {} region(s) patched",
                report.succeeded(),
                report.regions.len()
            );
            if report.is_complete() {
                pb.finish_with_message(message);
            } else {
                pb.abandon_with_message(message);
            }
        }
    }
}
