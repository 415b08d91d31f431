//! Patch engine runs against the simulated chip

use std::sync::atomic::{AtomicBool, Ordering};

use tbpatch_core::engine::{
    BatchReport, EngineConfig, NoProgress, PatchDirection, PatchEngine, PatchProgress,
    RegionOutcome,
};
use tbpatch_core::error::{Error, TransportFault};
use tbpatch_core::patch::{DataType, Patch, PatchSet};
use tbpatch_core::tps::commands;
use tbpatch_core::tps::{CommandTimings, DeviceConfig, Tps6598xDevice};
use tbpatch_dummy::{DummyConfig, DummyHpm, STATUS_FLASH_ERROR};

const CHIP: u64 = 0x38;

const ORIGINAL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];
const REPLACEMENT: [u8; 4] = [0x00, 0x11, 0x22, 0x33];

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Device whose flash holds `content` at `offset`
fn device_with(offset: u32, content: &[u8]) -> Tps6598xDevice<DummyHpm> {
    init();
    let hpm = DummyHpm::with_data(DummyConfig::default(), offset, content);
    Tps6598xDevice::new(hpm, CHIP)
}

fn patch_set(offset: u32) -> PatchSet {
    let mut set = PatchSet::new(offset, 4).unwrap();
    set.queue_patch(Patch::new(offset, ORIGINAL.to_vec(), REPLACEMENT.to_vec()).unwrap())
        .unwrap();
    set
}

fn run(
    dev: &mut Tps6598xDevice<DummyHpm>,
    config: EngineConfig,
    sets: &mut [PatchSet],
) -> BatchReport {
    PatchEngine::new(dev, config).run(sets, &mut NoProgress)
}

#[test]
fn test_install_over_original() {
    let mut dev = device_with(0x100, &ORIGINAL);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert!(report.is_complete());
    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 1 });
    assert_eq!(report.regions[0].data_type, DataType::MatchesReplace);
    assert_eq!(&dev.transport().flash()[0x100..0x104], &REPLACEMENT);
    assert_eq!(sets[0].data(), Some(&REPLACEMENT[..]));
}

#[test]
fn test_install_already_applied() {
    let mut dev = device_with(0x100, &REPLACEMENT);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert!(report.is_complete());
    assert_eq!(report.regions[0].outcome, RegionOutcome::AlreadyApplied);
    assert_eq!(dev.transport().modifying_commands(), 0);
}

#[test]
fn test_unexpected_content_left_alone() {
    let mut dev = device_with(0x100, &[1, 2, 3, 4]);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert!(!report.is_complete());
    assert_eq!(report.regions[0].outcome, RegionOutcome::UnexpectedContent);
    assert_eq!(report.regions[0].data_type, DataType::Unknown);
    assert_eq!(dev.transport().modifying_commands(), 0);
    assert_eq!(&dev.transport().flash()[0x100..0x104], &[1, 2, 3, 4]);
}

#[test]
fn test_dry_run_writes_nothing() {
    let mut dev = device_with(0x100, &ORIGINAL);
    let config = EngineConfig {
        dry_run: true,
        ..Default::default()
    };
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, config, &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::WouldApply);
    assert_eq!(report.regions[0].data_type, DataType::MatchesOriginal);
    assert_eq!(dev.transport().modifying_commands(), 0);
    assert!(dev.transport().command_count(commands::FLASH_READ) > 0);
}

#[test]
fn test_failed_write_retried_from_erase() {
    let mut dev = device_with(0x100, &ORIGINAL);
    dev.transport_mut()
        .fail_command(commands::FLASH_WRITE, 1, STATUS_FLASH_ERROR);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 2 });
    let hpm = dev.transport();
    assert_eq!(hpm.command_count(commands::FLASH_ERASE), 2);
    assert_eq!(hpm.command_count(commands::FLASH_WRITE), 2);
    assert_eq!(&hpm.flash()[0x100..0x104], &REPLACEMENT);
}

#[test]
fn test_corrupted_write_retried() {
    let mut dev = device_with(0x100, &ORIGINAL);
    dev.transport_mut().corrupt_write(1);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 2 });
    assert_eq!(&dev.transport().flash()[0x100..0x104], &REPLACEMENT);
}

#[test]
fn test_gives_up_after_max_attempts() {
    let mut dev = device_with(0x100, &ORIGINAL);
    for nth in 1..=3 {
        dev.transport_mut()
            .fail_command(commands::FLASH_ERASE, nth, STATUS_FLASH_ERROR);
    }
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(
        report.regions[0].outcome,
        RegionOutcome::Failed {
            error: Error::EraseFailed {
                status: STATUS_FLASH_ERROR
            },
            attempts: 3
        }
    );
    assert!(report.aborted.is_none());
    assert_eq!(dev.transport().command_count(commands::FLASH_ERASE), 3);
    assert_eq!(dev.transport().command_count(commands::FLASH_WRITE), 0);
}

#[test]
fn test_read_failure_retried() {
    let mut dev = device_with(0x100, &ORIGINAL);
    dev.transport_mut()
        .fail_command(commands::FLASH_READ, 1, STATUS_FLASH_ERROR);
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 1 });
}

#[test]
fn test_uninstall_restores_original() {
    let mut dev = device_with(0x100, &REPLACEMENT);
    let config = EngineConfig {
        direction: PatchDirection::Uninstall,
        ..Default::default()
    };
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, config, &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 1 });
    assert_eq!(report.regions[0].data_type, DataType::MatchesOriginal);
    assert_eq!(&dev.transport().flash()[0x100..0x104], &ORIGINAL);

    // Running it again finds nothing to do
    dev.transport_mut().clear_log();
    let report = run(&mut dev, config, &mut sets);
    assert_eq!(report.regions[0].outcome, RegionOutcome::AlreadyApplied);
    assert_eq!(dev.transport().modifying_commands(), 0);
}

#[test]
fn test_conflict_does_not_stop_batch() {
    init();
    let mut hpm = DummyHpm::new_default();
    hpm.load(0x100, &[9, 9, 9, 9]);
    hpm.load(0x200, &ORIGINAL);
    let mut dev = Tps6598xDevice::new(hpm, CHIP);

    let mut sets = [patch_set(0x100), patch_set(0x200)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::UnexpectedContent);
    assert_eq!(report.regions[1].outcome, RegionOutcome::Applied { attempts: 1 });
    assert_eq!(report.succeeded(), 1);
    assert_eq!(report.written(), 1);
}

#[test]
fn test_transport_failure_aborts_batch() {
    let mut dev = device_with(0x100, &ORIGINAL);
    dev.transport_mut().fail_transport(-5);
    let mut sets = [patch_set(0x100), patch_set(0x200), patch_set(0x300)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    let fault = Error::Transport(TransportFault::new(-5));
    assert_eq!(report.aborted, Some(fault));
    assert_eq!(
        report.regions[0].outcome,
        RegionOutcome::Failed {
            error: fault,
            attempts: 1
        }
    );
    assert_eq!(report.regions[1].outcome, RegionOutcome::Skipped);
    assert_eq!(report.regions[2].outcome, RegionOutcome::Skipped);
}

#[test]
fn test_cancel_before_start() {
    let mut dev = device_with(0x100, &ORIGINAL);
    let cancel = AtomicBool::new(true);
    let mut sets = [patch_set(0x100)];
    let report = PatchEngine::new(&mut dev, EngineConfig::default())
        .with_cancel(&cancel)
        .run(&mut sets, &mut NoProgress);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Cancelled);
    assert!(dev.transport().commands().is_empty());
}

/// Sets the cancel flag once the first region is done
struct CancelAfterFirst<'a> {
    cancel: &'a AtomicBool,
    retries: u32,
}

impl PatchProgress for CancelAfterFirst<'_> {
    fn batch_started(&mut self, _regions: usize) {}
    fn region_started(&mut self, _index: usize, _offset: u32, _size: u32) {}
    fn region_classified(&mut self, _index: usize, _data_type: DataType) {}
    fn attempt_failed(&mut self, _index: usize, _attempt: u32, _error: &Error) {
        self.retries += 1;
    }
    fn region_finished(&mut self, index: usize, _outcome: &RegionOutcome) {
        if index == 0 {
            self.cancel.store(true, Ordering::SeqCst);
        }
    }
    fn complete(&mut self, _report: &BatchReport) {}
}

#[test]
fn test_cancel_between_regions() {
    init();
    let mut hpm = DummyHpm::new_default();
    hpm.load(0x100, &ORIGINAL);
    hpm.load(0x200, &ORIGINAL);
    hpm.fail_command(commands::FLASH_WRITE, 1, STATUS_FLASH_ERROR);
    let mut dev = Tps6598xDevice::new(hpm, CHIP);

    let cancel = AtomicBool::new(false);
    let mut progress = CancelAfterFirst {
        cancel: &cancel,
        retries: 0,
    };
    let mut sets = [patch_set(0x100), patch_set(0x200)];
    let report = PatchEngine::new(&mut dev, EngineConfig::default())
        .with_cancel(&cancel)
        .run(&mut sets, &mut progress);

    assert_eq!(progress.retries, 1);
    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 2 });
    assert_eq!(report.regions[1].outcome, RegionOutcome::Cancelled);
    assert_eq!(&dev.transport().flash()[0x200..0x204], &ORIGINAL);
}

#[test]
fn test_verify_image_after_commit() {
    let mut dev = device_with(0x100, &ORIGINAL);
    let config = EngineConfig {
        verify_image: true,
        ..Default::default()
    };
    let mut sets = [patch_set(0x100)];
    let report = run(&mut dev, config, &mut sets);

    assert!(report.is_complete());
    assert_eq!(dev.transport().command_count(commands::FLASH_VERIFY), 1);
}

#[test]
fn test_patches_in_secondary_region() {
    init();
    let hpm = DummyHpm::with_data(DummyConfig::default(), 0x8000 + 0x40, &ORIGINAL);
    let config = DeviceConfig {
        region: 1,
        ..Default::default()
    };
    let mut dev = Tps6598xDevice::with_config(hpm, CHIP, config);

    let mut sets = [patch_set(0x40)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert!(report.is_complete());
    let flash = dev.transport().flash();
    assert_eq!(&flash[0x8040..0x8044], &REPLACEMENT);
    assert_eq!(&flash[0x40..0x44], &[0xFF; 4]);
}

#[test]
fn test_grouped_patches_committed_together() {
    init();
    let mut hpm = DummyHpm::new_default();
    hpm.load(0x400, &[0xAA; 12]);
    let mut dev = Tps6598xDevice::new(hpm, CHIP);

    let patches = vec![
        Patch::new(0x404, vec![0xAA; 4], vec![0x01; 4]).unwrap(),
        Patch::new(0x400, vec![0xAA; 4], vec![0x02; 4]).unwrap(),
        Patch::replace_only(0x408, vec![0x03; 4]).unwrap(),
    ];
    let mut sets = PatchSet::group(patches);
    assert_eq!(sets.len(), 1);

    let report = run(&mut dev, EngineConfig::default(), &mut sets);
    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 1 });
    assert_eq!(dev.transport().command_count(commands::FLASH_ERASE), 1);
    assert_eq!(
        &dev.transport().flash()[0x400..0x40C],
        &[2, 2, 2, 2, 1, 1, 1, 1, 3, 3, 3, 3]
    );
}

#[test]
fn test_noop_patch_issues_no_flash_commands() {
    let mut dev = device_with(0x100, &ORIGINAL);
    let mut set = PatchSet::new(0x100, 4).unwrap();
    set.queue_patch(Patch::new(0x100, ORIGINAL.to_vec(), ORIGINAL.to_vec()).unwrap())
        .unwrap();
    let mut sets = [set];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].data_type, DataType::MatchesBoth);
    assert_eq!(report.regions[0].outcome, RegionOutcome::AlreadyApplied);
    assert_eq!(dev.transport().modifying_commands(), 0);
}

#[test]
fn test_partial_write_retry_rewrites_whole_region() {
    let original: Vec<u8> = (0..48).collect();
    let replacement: Vec<u8> = (0..48).map(|b| 0x80 | b).collect();
    let mut dev = device_with(0x600, &original);
    dev.transport_mut()
        .fail_command(commands::FLASH_WRITE, 2, STATUS_FLASH_ERROR);

    let mut set = PatchSet::new(0x600, 48).unwrap();
    set.queue_patch(Patch::new(0x600, original, replacement.clone()).unwrap())
        .unwrap();
    let mut sets = [set];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(report.regions[0].outcome, RegionOutcome::Applied { attempts: 2 });
    let hpm = dev.transport();
    assert_eq!(hpm.command_count(commands::FLASH_ERASE), 2);
    // Two chunks on the failed attempt, all three again on the retry
    assert_eq!(hpm.command_count(commands::FLASH_WRITE), 5);
    assert_eq!(&hpm.flash()[0x600..0x630], replacement.as_slice());
}

#[test]
fn test_uninstall_without_originals_fails() {
    let mut dev = device_with(0x100, &[0xAA, 0xBB]);
    let mut set = PatchSet::new(0x100, 2).unwrap();
    set.queue_patch(Patch::replace_only(0x100, vec![0xAA, 0xBB]).unwrap())
        .unwrap();
    let config = EngineConfig {
        direction: PatchDirection::Uninstall,
        ..Default::default()
    };
    let mut sets = [set];
    let report = run(&mut dev, config, &mut sets);

    assert!(!report.is_complete());
    assert_eq!(
        report.regions[0].outcome,
        RegionOutcome::Failed {
            error: Error::InvalidPatch,
            attempts: 0
        }
    );
    assert!(report.aborted.is_none());
    assert!(dev.transport().commands().is_empty());
    assert_eq!(&dev.transport().flash()[0x100..0x102], &[0xAA, 0xBB]);
}

#[test]
fn test_hung_erase_times_out_and_batch_continues() {
    init();
    let mut hpm = DummyHpm::new_default();
    hpm.load(0x100, &ORIGINAL);
    hpm.load(0x200, &REPLACEMENT);
    hpm.hang_command(commands::FLASH_ERASE);
    let config = DeviceConfig {
        erase_timings: CommandTimings {
            poll_delay_us: 10,
            timeout_us: 100,
        },
        ..Default::default()
    };
    let mut dev = Tps6598xDevice::with_config(hpm, CHIP, config);

    let mut sets = [patch_set(0x100), patch_set(0x200)];
    let report = run(&mut dev, EngineConfig::default(), &mut sets);

    assert_eq!(
        report.regions[0].outcome,
        RegionOutcome::Failed {
            error: Error::CommandTimeout {
                cmd: commands::FLASH_ERASE
            },
            attempts: 3
        }
    );
    assert!(report.aborted.is_none());
    assert_eq!(report.regions[1].outcome, RegionOutcome::AlreadyApplied);

    let hpm = dev.transport();
    assert_eq!(hpm.command_count(commands::FLASH_ERASE), 3);
    assert_eq!(hpm.command_count(commands::FLASH_WRITE), 0);
    assert_eq!(&hpm.flash()[0x100..0x104], &ORIGINAL);
}
