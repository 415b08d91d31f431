//! Single patch value type

use alloc::vec::Vec;
use core::ops::Range;

use crate::error::{Error, Result};

/// One edit to the firmware image
///
/// The patch replaces `size` bytes at `offset` with `replacement`. The
/// `original` bytes are the content expected before patching; they may be
/// absent when the caller has no reference to check against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    offset: u32,
    original: Option<Vec<u8>>,
    replacement: Vec<u8>,
}

impl Patch {
    /// Create a patch with known original content
    ///
    /// # Errors
    /// * `InvalidPatch` - if the buffers are empty, differ in length, or the
    ///   range overflows the 32-bit image address space
    pub fn new(offset: u32, original: Vec<u8>, replacement: Vec<u8>) -> Result<Self> {
        if original.len() != replacement.len() {
            return Err(Error::InvalidPatch);
        }
        Self::build(offset, Some(original), replacement)
    }

    /// Create a patch whose original content is unknown
    pub fn replace_only(offset: u32, replacement: Vec<u8>) -> Result<Self> {
        Self::build(offset, None, replacement)
    }

    fn build(offset: u32, original: Option<Vec<u8>>, replacement: Vec<u8>) -> Result<Self> {
        let size = u32::try_from(replacement.len()).map_err(|_| Error::InvalidPatch)?;
        if size == 0 || offset.checked_add(size).is_none() {
            return Err(Error::InvalidPatch);
        }
        Ok(Self {
            offset,
            original,
            replacement,
        })
    }

    /// Image offset of the first patched byte
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Number of patched bytes
    pub fn size(&self) -> u32 {
        // Bounded by the constructor
        self.replacement.len() as u32
    }

    /// Image offset one past the last patched byte
    pub fn end(&self) -> u32 {
        self.offset + self.size()
    }

    /// Byte range covered by this patch
    pub fn range(&self) -> Range<u32> {
        self.offset..self.end()
    }

    /// Whether `addr` falls inside the patched range
    pub fn covers_byte(&self, addr: u32) -> bool {
        self.range().contains(&addr)
    }

    /// Expected pre-patch content, if known
    pub fn bytes_original(&self) -> Option<&[u8]> {
        self.original.as_deref()
    }

    /// Content to install
    pub fn bytes_replacement(&self) -> &[u8] {
        &self.replacement
    }

    /// Whether installing this patch changes nothing
    pub fn is_noop(&self) -> bool {
        self.original.as_deref() == Some(self.replacement.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_new_rejects_empty() {
        assert_eq!(Patch::new(0, vec![], vec![]), Err(Error::InvalidPatch));
        assert_eq!(Patch::replace_only(0, vec![]), Err(Error::InvalidPatch));
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        assert_eq!(
            Patch::new(0x10, vec![1, 2, 3], vec![1, 2]),
            Err(Error::InvalidPatch)
        );
    }

    #[test]
    fn test_new_rejects_overflow() {
        assert_eq!(
            Patch::new(u32::MAX - 1, vec![0; 4], vec![1; 4]),
            Err(Error::InvalidPatch)
        );
        // Ends exactly at the top of the address space
        assert!(Patch::new(u32::MAX - 4, vec![0; 4], vec![1; 4]).is_ok());
    }

    #[test]
    fn test_covers_byte() {
        let patch = Patch::new(0x100, vec![0; 4], vec![1; 4]).unwrap();
        assert!(!patch.covers_byte(0xFF));
        assert!(patch.covers_byte(0x100));
        assert!(patch.covers_byte(0x103));
        assert!(!patch.covers_byte(0x104));
        assert_eq!(patch.end(), 0x104);
    }

    #[test]
    fn test_noop() {
        assert!(Patch::new(0, vec![7, 7], vec![7, 7]).unwrap().is_noop());
        assert!(!Patch::new(0, vec![7, 7], vec![7, 8]).unwrap().is_noop());
        assert!(!Patch::replace_only(0, vec![7]).unwrap().is_noop());
    }
}
