//! Patch set: merged patches over one contiguous region

use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Range;

use super::Patch;
use crate::error::{Error, Result};

/// Classification of device data against a patch set's references
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataType {
    /// Data matches neither reference, or has not been read yet
    #[default]
    Unknown,
    /// Data equals the materialized original only
    MatchesOriginal,
    /// Data equals the materialized replacement only
    MatchesReplace,
    /// Original and replacement are identical and data equals both
    MatchesBoth,
}

impl DataType {
    /// Classify `data` against the materialized original and replacement
    pub fn classify(data: &[u8], original: &[u8], replacement: &[u8]) -> Self {
        match (data == original, data == replacement) {
            (true, true) => Self::MatchesBoth,
            (true, false) => Self::MatchesOriginal,
            (false, true) => Self::MatchesReplace,
            (false, false) => Self::Unknown,
        }
    }

    /// Whether the data equals the materialized original
    pub fn matches_original(&self) -> bool {
        matches!(self, Self::MatchesOriginal | Self::MatchesBoth)
    }

    /// Whether the data equals the materialized replacement
    pub fn matches_replace(&self) -> bool {
        matches!(self, Self::MatchesReplace | Self::MatchesBoth)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::MatchesOriginal => "original",
            Self::MatchesReplace => "replaced",
            Self::MatchesBoth => "original/replaced",
        };
        f.write_str(s)
    }
}

/// Patches queued against one contiguous region of the image
///
/// The region is fixed at construction. The set remembers the data most
/// recently read from the device and its classification; queuing more
/// patches does not reclassify, only [`record_device_data`] does.
///
/// [`record_device_data`]: PatchSet::record_device_data
#[derive(Debug, Clone)]
pub struct PatchSet {
    offset: u32,
    size: u32,
    queue: Vec<Patch>,
    data: Option<Vec<u8>>,
    data_type: DataType,
}

impl PatchSet {
    /// Create an empty patch set for `[offset, offset + size)`
    ///
    /// # Errors
    /// * `InvalidRange` - if `size` is zero or the range overflows
    pub fn new(offset: u32, size: u32) -> Result<Self> {
        if size == 0 || offset.checked_add(size).is_none() {
            return Err(Error::InvalidRange);
        }
        Ok(Self {
            offset,
            size,
            queue: Vec::new(),
            data: None,
            data_type: DataType::Unknown,
        })
    }

    /// Group a flat list of patches into patch sets
    ///
    /// Overlapping or adjacent patches end up in the same set. Sets are
    /// returned in ascending offset order; inside each set the patches keep
    /// the order they were supplied in.
    pub fn group(patches: impl IntoIterator<Item = Patch>) -> Vec<PatchSet> {
        let patches: Vec<Patch> = patches.into_iter().collect();

        let mut ranges: Vec<Range<u32>> = patches.iter().map(Patch::range).collect();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<Range<u32>> = Vec::new();
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }

        let mut sets: Vec<PatchSet> = merged
            .iter()
            .map(|r| PatchSet {
                offset: r.start,
                size: r.end - r.start,
                queue: Vec::new(),
                data: None,
                data_type: DataType::Unknown,
            })
            .collect();

        for patch in patches {
            let idx = merged
                .partition_point(|r| r.end < patch.end())
                .min(sets.len() - 1);
            sets[idx].queue.push(patch);
        }

        sets
    }

    /// First byte of the region
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Size of the region in bytes
    pub fn size(&self) -> u32 {
        self.size
    }

    /// One past the last byte of the region
    pub fn end(&self) -> u32 {
        self.offset + self.size
    }

    /// Number of queued patches
    pub fn num_patches(&self) -> usize {
        self.queue.len()
    }

    /// Queued patches in insertion order
    pub fn patches(&self) -> &[Patch] {
        &self.queue
    }

    /// Whether every queued patch carries its original bytes
    ///
    /// Without them the original content of the region cannot be
    /// materialized, so the set cannot be uninstalled.
    pub fn has_originals(&self) -> bool {
        self.queue.iter().all(|p| p.bytes_original().is_some())
    }

    /// Data last recorded from the device
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Classification of the last recorded data
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Queue a patch; later patches win where they overlap earlier ones
    ///
    /// # Errors
    /// * `OutOfRange` - if the patch is not fully inside the region
    pub fn queue_patch(&mut self, patch: Patch) -> Result<()> {
        if patch.offset() < self.offset || patch.end() > self.end() {
            return Err(Error::OutOfRange);
        }
        self.queue.push(patch);
        Ok(())
    }

    /// Record freshly read device data and reclassify it
    ///
    /// # Errors
    /// * `InvalidRange` - if `data` is not exactly `size` bytes long
    pub fn record_device_data(&mut self, data: Vec<u8>) -> Result<DataType> {
        if data.len() != self.size as usize {
            return Err(Error::InvalidRange);
        }
        self.data = Some(data);

        let original = self.patch_data_with_original(true);
        let replacement = self.patch_data_with_original(false);
        let data = self.data.as_deref().unwrap_or_default();
        self.data_type = DataType::classify(data, &original, &replacement);

        log::trace!(
            "patch set 0x{:08X}+0x{:X}: device data is {}",
            self.offset,
            self.size,
            self.data_type
        );
        Ok(self.data_type)
    }

    /// Materialize the region with all patches applied
    ///
    /// Starts from the recorded device data (zero-filled when nothing has
    /// been read) and overlays each patch's original bytes when
    /// `want_original` is set, its replacement bytes otherwise. Patches with
    /// unknown original content leave the base bytes in place when the
    /// original is requested.
    pub fn patch_data_with_original(&self, want_original: bool) -> Vec<u8> {
        let mut buf = match &self.data {
            Some(data) => data.clone(),
            None => vec![0u8; self.size as usize],
        };

        for patch in &self.queue {
            let bytes = if want_original {
                match patch.bytes_original() {
                    Some(bytes) => bytes,
                    None => continue,
                }
            } else {
                patch.bytes_replacement()
            };
            let start = (patch.offset() - self.offset) as usize;
            buf[start..start + bytes.len()].copy_from_slice(bytes);
        }

        buf
    }
}
