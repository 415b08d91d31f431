//! Batch report rendering

use std::fmt::Write;

use tbpatch_core::engine::{BatchReport, RegionOutcome};

/// Render the report as a table, one region per line
pub fn format_report(report: &BatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>3}  {:<10}  {:>6}  {:<17}  outcome",
        "#", "offset", "size", "device data"
    );
    for region in &report.regions {
        let _ = writeln!(
            out,
            "{:>3}  0x{:08X}  {:>6}  {:<17}  {}",
            region.index,
            region.offset,
            region.size,
            region.data_type.to_string(),
            region.outcome
        );
    }
    if let Some(error) = &report.aborted {
        let _ = writeln!(out, "aborted: {}", error);
    }
    out
}

/// Log each region's outcome at a level matching its severity
pub fn log_report(report: &BatchReport) {
    for region in &report.regions {
        let line = format!(
            "region {} (0x{:08X}+0x{:X}, {}): {}",
            region.index, region.offset, region.size, region.data_type, region.outcome
        );
        match region.outcome {
            RegionOutcome::AlreadyApplied
            | RegionOutcome::Applied { .. }
            | RegionOutcome::WouldApply => log::info!("{}", line),
            RegionOutcome::UnexpectedContent
            | RegionOutcome::Skipped
            | RegionOutcome::Cancelled => log::warn!("{}", line),
            RegionOutcome::Failed { .. } => log::error!("{}", line),
        }
    }
    log::info!(
        "{} of {} region(s) patched, {} written",
        report.succeeded(),
        report.regions.len(),
        report.written()
    );
}
