//! Heap-backed durable mapping with crash simulation
//!
//! `HeapMap` keeps two copies of the mapped range: the working bytes that
//! plain stores hit immediately, and a durable shadow that only advances
//! when a range is flushed. [`HeapMap::crash`] produces a new map holding
//! exactly the durable shadow: everything written but not flushed is gone,
//! which is precisely the state an unclean shutdown leaves behind.
//!
//! Clones share the same backing storage, so a test can keep a handle,
//! hand a clone to a stream, and later take a crash snapshot:
//!
//! ```
//! use lodestream::{Config, HeapMap, Stream};
//!
//! let map = HeapMap::new(1 << 20);
//! let config = Config::builder().stream_size(1 << 20).build();
//! let stream = Stream::from_map(Box::new(map.clone()), &config).unwrap();
//! let region = stream.region_allocate(4096).unwrap();
//! stream.append(region, b"durable").unwrap();
//! drop(stream);
//!
//! let reopened = Stream::open(Box::new(map.crash())).unwrap();
//! assert_eq!(reopened.region_count(), 1);
//! ```

use std::cell::UnsafeCell;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::map::{check_range, DurableMap};

struct HeapInner {
    /// Working bytes, updated by every store
    working: UnsafeCell<Box<[u8]>>,
    /// Durable shadow, updated only by flush
    durable: Mutex<Box<[u8]>>,
}

// SAFETY: working-copy access goes through raw pointers under the
// DurableMap aliasing contract (disjoint concurrent ranges); the shadow is
// mutex-protected.
unsafe impl Send for HeapInner {}
unsafe impl Sync for HeapInner {}

/// An in-memory durable mapping for tests and experimentation
#[derive(Clone)]
pub struct HeapMap {
    inner: Arc<HeapInner>,
}

impl HeapMap {
    /// Create a zero-filled mapping of `size` bytes
    pub fn new(size: u64) -> Self {
        let size = size as usize;
        Self {
            inner: Arc::new(HeapInner {
                working: UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
                durable: Mutex::new(vec![0u8; size].into_boxed_slice()),
            }),
        }
    }

    /// Simulate an unclean shutdown
    ///
    /// Returns a fresh map whose contents are exactly the bytes that were
    /// flushed on this one; unflushed stores are discarded. The new map
    /// shares nothing with `self`, so both can be opened independently.
    pub fn crash(&self) -> HeapMap {
        let durable = self.inner.durable.lock();
        let snapshot: Box<[u8]> = durable.clone();
        Self {
            inner: Arc::new(HeapInner {
                working: UnsafeCell::new(snapshot.clone()),
                durable: Mutex::new(snapshot),
            }),
        }
    }
}

impl DurableMap for HeapMap {
    fn len(&self) -> u64 {
        // SAFETY: reading the length does not touch element bytes.
        unsafe { (&*self.inner.working.get()).len() as u64 }
    }

    fn slice(&self, offset: u64, length: u64) -> &[u8] {
        check_range(self.len(), offset, length);
        // SAFETY: range checked; disjointness per the aliasing contract.
        unsafe {
            let base = (*self.inner.working.get()).as_ptr();
            std::slice::from_raw_parts(base.add(offset as usize), length as usize)
        }
    }

    fn write(&self, offset: u64, data: &[u8]) {
        check_range(self.len(), offset, data.len() as u64);
        // SAFETY: range checked; disjointness per the aliasing contract.
        unsafe {
            let base = (*self.inner.working.get()).as_mut_ptr();
            std::ptr::copy_nonoverlapping(data.as_ptr(), base.add(offset as usize), data.len());
        }
    }

    fn flush(&self, offset: u64, length: u64) -> Result<()> {
        check_range(self.len(), offset, length);
        let mut durable = self.inner.durable.lock();
        durable[offset as usize..(offset + length) as usize]
            .copy_from_slice(self.slice(offset, length));
        Ok(())
    }

    fn drain(&self) -> Result<()> {
        // Flushes copy synchronously into the shadow, so there is nothing
        // left in flight.
        Ok(())
    }
}
