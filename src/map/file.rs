//! File-backed durable mapping
//!
//! Maps a regular file with `memmap2` and implements the flush barrier with
//! a synchronous `flush_range` (msync). Because the flush itself blocks
//! until the range is durable, `drain` is a no-op here; the two-step
//! barrier exists for adapters whose flush only initiates writeback.

use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::path::Path;

use memmap2::{MmapMut, MmapOptions};

use crate::error::Result;
use crate::map::{check_range, DurableMap};

/// A durable mapping over a regular file
pub struct FileMap {
    mmap: UnsafeCell<MmapMut>,
}

// SAFETY: all access goes through raw pointers obtained from the UnsafeCell;
// the DurableMap aliasing contract guarantees concurrently accessed ranges
// are disjoint.
unsafe impl Send for FileMap {}
unsafe impl Sync for FileMap {}

impl FileMap {
    /// Open `path` if it exists, or create it with `size` bytes otherwise
    ///
    /// An existing file keeps its current length if it is already at least
    /// `size`; a shorter or fresh file is extended to `size` (zero-filled).
    pub fn open_or_create(path: &Path, size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if file.metadata()?.len() < size {
            file.set_len(size)?;
        }

        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        Ok(Self {
            mmap: UnsafeCell::new(mmap),
        })
    }
}

impl DurableMap for FileMap {
    fn len(&self) -> u64 {
        // SAFETY: reading the mapping's length does not touch mapped bytes.
        unsafe { (&*self.mmap.get()).len() as u64 }
    }

    fn slice(&self, offset: u64, length: u64) -> &[u8] {
        check_range(self.len(), offset, length);
        // SAFETY: range checked above; the aliasing contract guarantees no
        // concurrent writer targets these bytes.
        unsafe {
            let base = (*self.mmap.get()).as_ptr();
            std::slice::from_raw_parts(base.add(offset as usize), length as usize)
        }
    }

    fn write(&self, offset: u64, data: &[u8]) {
        check_range(self.len(), offset, data.len() as u64);
        // SAFETY: range checked above; disjointness per the aliasing contract.
        unsafe {
            let base = (*self.mmap.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset as usize), data.len());
        }
    }

    fn flush(&self, offset: u64, length: u64) -> Result<()> {
        check_range(self.len(), offset, length);
        // SAFETY: flush_range only reads the mapping metadata and issues msync.
        unsafe { (*self.mmap.get()).flush_range(offset as usize, length as usize)? };
        Ok(())
    }

    fn drain(&self) -> Result<()> {
        // flush_range is synchronous, so every flushed range is already durable.
        Ok(())
    }
}
