//! Stream Module
//!
//! The core engine that coordinates all components.
//!
//! ## Responsibilities
//! - Open/create a stream over a durable mapping
//! - Rebuild allocator state from persisted bytes on open (recovery)
//! - Allocate and free regions with durable state transitions
//! - Append entries (atomically or via reserve/publish)
//! - Iterate regions and entries, validate entry handles
//!
//! ## Concurrency Model
//!
//! One mutex over the allocator (free list, tail pointer, per-region append
//! cursors) serializes allocate/free and the cursor advance inside reserve.
//! Payload writes and publish flushes run outside the lock: reservations
//! hold disjoint byte ranges, so they never contend once space is claimed.
//! Iterators take the lock only to step to the next region; they do not
//! observe concurrent mutation atomically, which is the documented caller
//! obligation.

mod append;
mod iterator;
mod recovery;

pub use append::Reservation;
pub use iterator::{EntryIterator, RegionIterator};
pub use recovery::RecoveryReport;

use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info, trace};

use crate::alloc::RegionAllocator;
use crate::config::Config;
use crate::error::{LodeError, Result};
use crate::layout::{
    align_up, RegionHeader, RegionState, StreamHeader, ENTRY_HEADER_SIZE, FORMAT_VERSION,
    REGION_HEADER_SIZE, STREAM_HEADER_SIZE, STREAM_MAGIC,
};
use crate::map::{DurableMap, FileMap};

// =============================================================================
// Handles
// =============================================================================

/// Handle to an allocated region
///
/// The offset is the region's stable identity; the generation stamp
/// distinguishes successive allocations of the same offset. Every
/// dereference through the stream re-validates the stamp, so a handle held
/// across a free (or a free-then-reallocate) is rejected with
/// [`LodeError::StaleHandle`] instead of reading another allocation's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    offset: u64,
    generation: u64,
}

impl Region {
    /// Block-aligned offset of the region header within the stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Generation stamp this handle was issued under
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Handle to a committed entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    region: Region,
    /// Absolute offset of the entry header within the stream
    offset: u64,
    length: u64,
}

impl Entry {
    /// Absolute offset of the entry header within the stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload length in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// The region this entry was committed into
    pub fn region(&self) -> Region {
        self.region
    }
}

// =============================================================================
// Stream
// =============================================================================

/// A log-structured stream of regions over a durable mapping
pub struct Stream {
    /// The only path to physical durability
    map: Box<dyn DurableMap>,
    /// Block granularity; all region offsets and footprints are multiples
    block_size: u64,
    /// Usable extent recorded in the stream header
    total_size: u64,
    /// Allocator state: free list, allocated table, tail, generations
    state: Mutex<RegionAllocator>,
    /// What the recovery scan found at open (empty for created streams)
    recovery: RecoveryReport,
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("block_size", &self.block_size)
            .field("total_size", &self.total_size)
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl Stream {
    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initialize a fresh stream on `map`
    ///
    /// Writes and durably flushes the stream header. Fails if the mapping
    /// cannot hold the header block plus at least one region block.
    pub fn create(map: Box<dyn DurableMap>, config: &Config) -> Result<Self> {
        config.validate()?;

        let block_size = config.block_size;
        let total_size = map.len() & !(block_size - 1);
        if total_size < block_size * 2 {
            return Err(LodeError::Config(format!(
                "mapping of {} bytes leaves no region space with block size {}",
                map.len(),
                block_size
            )));
        }

        let header = StreamHeader {
            version: FORMAT_VERSION,
            block_size,
            total_size,
        };
        map.write(0, &header.encode());
        map.flush(0, STREAM_HEADER_SIZE)?;
        map.drain()?;

        info!(block_size, total_size, "created stream");

        Ok(Self {
            map,
            block_size,
            total_size,
            state: Mutex::new(RegionAllocator::new(block_size, total_size)),
            recovery: RecoveryReport::default(),
        })
    }

    /// Open an existing stream from `map`, rebuilding all in-memory state
    /// from the persisted bytes
    ///
    /// The only fatal outcome is an unreadable or mismatched stream header
    /// ([`LodeError::CorruptStream`]); torn entries and stray invalid region
    /// headers are healed by truncation during the scan.
    pub fn open(map: Box<dyn DurableMap>) -> Result<Self> {
        if map.len() < STREAM_HEADER_SIZE {
            return Err(LodeError::CorruptStream(format!(
                "mapping too small for stream header: {} bytes",
                map.len()
            )));
        }
        let header = StreamHeader::decode(map.slice(0, STREAM_HEADER_SIZE))?;

        if !header.block_size.is_power_of_two() || header.block_size < STREAM_HEADER_SIZE {
            return Err(LodeError::CorruptStream(format!(
                "implausible block size {}",
                header.block_size
            )));
        }
        if header.total_size > map.len() {
            return Err(LodeError::CorruptStream(format!(
                "stream header claims {} bytes but mapping holds {}",
                header.total_size,
                map.len()
            )));
        }

        let (allocator, report) =
            recovery::scan(map.as_ref(), header.block_size, header.total_size);
        info!(
            regions_allocated = report.regions_allocated,
            regions_free = report.regions_free,
            entries_recovered = report.entries_recovered,
            regions_truncated = report.regions_truncated,
            "opened stream"
        );

        Ok(Self {
            map,
            block_size: header.block_size,
            total_size: header.total_size,
            state: Mutex::new(allocator),
            recovery: report,
        })
    }

    /// Open `map` if it already carries a stream, or initialize a fresh one
    /// otherwise
    ///
    /// Detection looks at the stream magic only: a present-but-corrupt
    /// header is surfaced as [`LodeError::CorruptStream`] rather than
    /// silently reinitialized over.
    pub fn from_map(map: Box<dyn DurableMap>, config: &Config) -> Result<Self> {
        if map.len() >= STREAM_MAGIC.len() as u64
            && map.slice(0, STREAM_MAGIC.len() as u64) == STREAM_MAGIC
        {
            Self::open(map)
        } else {
            Self::create(map, config)
        }
    }

    /// Convenience: map `path` (creating it with `config.stream_size` bytes
    /// if absent) and open-or-create a stream on it
    pub fn open_file(path: &Path, config: &Config) -> Result<Self> {
        config.validate()?;
        let map = FileMap::open_or_create(path, config.stream_size)?;
        Self::from_map(Box::new(map), config)
    }

    /// Close the stream, persisting each live region's append cursor into
    /// the advisory committed-offset header field
    ///
    /// Purely a clean-shutdown hint for inspection tooling; recovery never
    /// trusts this field and always recomputes by scanning.
    pub fn close(self) -> Result<()> {
        let state = self.state.lock();
        for (offset, region) in state.iter_allocated() {
            let header = RegionHeader {
                state: RegionState::Allocated,
                generation: region.generation,
                capacity: region.capacity,
                committed_offset: region.append_offset,
            };
            self.map.write(offset, &header.encode());
            self.map.flush(offset, REGION_HEADER_SIZE)?;
        }
        self.map.drain()?;
        debug!(regions = state.count_allocated(), "closed stream");
        Ok(())
    }

    // =========================================================================
    // Region Allocation
    // =========================================================================

    /// Allocate a region with at least `size` bytes of entry capacity
    ///
    /// The footprint (header + capacity) is rounded up to the block
    /// granularity, so the usable capacity may exceed the request. Reuses
    /// the most recently freed region when its capacity suffices, else
    /// carves from the tail; [`LodeError::OutOfSpace`] when neither fits
    /// (with no durable side effect).
    ///
    /// The ALLOCATED header (and a zeroed first entry slot, so a reused
    /// region never resurrects old entries) is flushed and drained before
    /// the handle is returned: after a crash the region is either fully
    /// allocated or absent, never in between.
    pub fn region_allocate(&self, size: u64) -> Result<Region> {
        let footprint = align_up(REGION_HEADER_SIZE + size, self.block_size);

        let mut state = self.state.lock();
        let placement = state.allocate(footprint).ok_or(LodeError::OutOfSpace {
            requested: footprint,
            available: state.tail_available(),
        })?;

        let header = RegionHeader {
            state: RegionState::Allocated,
            generation: placement.generation,
            capacity: placement.capacity,
            committed_offset: 0,
        };
        self.map.write(placement.offset, &header.encode());

        let mut flush_len = REGION_HEADER_SIZE;
        if placement.capacity >= ENTRY_HEADER_SIZE {
            self.map.write(
                placement.offset + REGION_HEADER_SIZE,
                &[0u8; ENTRY_HEADER_SIZE as usize],
            );
            flush_len += ENTRY_HEADER_SIZE;
        }
        self.map.flush(placement.offset, flush_len)?;
        self.map.drain()?;

        trace!(
            offset = placement.offset,
            generation = placement.generation,
            capacity = placement.capacity,
            reused = placement.reused,
            "allocated region"
        );

        Ok(Region {
            offset: placement.offset,
            generation: placement.generation,
        })
    }

    /// Free an allocated region, invalidating all of its entries
    ///
    /// Rejects handles whose generation no longer matches the live region
    /// at that offset ([`LodeError::StaleHandle`]). The FREE header is
    /// flushed and drained before the slot joins the in-memory free list
    /// (most-recently-freed is reused first).
    pub fn region_free(&self, region: Region) -> Result<()> {
        let mut state = self.state.lock();
        let live = self.validate_handle(&state, region)?;

        let header = RegionHeader {
            state: RegionState::Free,
            generation: region.generation,
            capacity: live.capacity,
            committed_offset: 0,
        };
        self.map.write(region.offset, &header.encode());
        self.map.flush(region.offset, REGION_HEADER_SIZE)?;
        self.map.drain()?;

        state.free(region.offset);

        trace!(
            offset = region.offset,
            generation = region.generation,
            "freed region"
        );

        Ok(())
    }

    // =========================================================================
    // Iteration & Entry Access
    // =========================================================================

    /// Lazy iterator over currently-allocated regions in ascending offset
    /// order
    pub fn regions(&self) -> RegionIterator<'_> {
        RegionIterator::new(self)
    }

    /// Lazy iterator over the committed entries of `region`, in offset
    /// order, stopping at the first torn entry exactly where recovery would
    pub fn entries(&self, region: Region) -> Result<EntryIterator<'_>> {
        let state = self.state.lock();
        let live = self.validate_handle(&state, region)?;
        let capacity = live.capacity;
        drop(state);
        Ok(EntryIterator::new(self, region, capacity))
    }

    /// Borrow the payload bytes of a committed entry
    ///
    /// Re-validates the owning region's generation stamp, so entries of a
    /// freed (or freed-and-reused) region are rejected rather than read.
    pub fn entry_data(&self, entry: &Entry) -> Result<&[u8]> {
        let state = self.state.lock();
        let live = self.validate_handle(&state, entry.region)?;
        let area_end = entry.region.offset + REGION_HEADER_SIZE + live.capacity;
        if entry.offset + ENTRY_HEADER_SIZE + entry.length > area_end {
            return Err(LodeError::InvalidArgument(format!(
                "entry at {} overruns its region",
                entry.offset
            )));
        }
        drop(state);
        Ok(self.map.slice(entry.offset + ENTRY_HEADER_SIZE, entry.length))
    }

    /// Payload length of a committed entry, with the same stamp validation
    /// as [`entry_data`](Self::entry_data)
    pub fn entry_length(&self, entry: &Entry) -> Result<u64> {
        let state = self.state.lock();
        self.validate_handle(&state, entry.region)?;
        Ok(entry.length)
    }

    // =========================================================================
    // Accessors (for tooling, tests, and debugging)
    // =========================================================================

    /// Number of currently allocated regions
    pub fn region_count(&self) -> usize {
        self.state.lock().count_allocated()
    }

    /// Entry-area capacity of an allocated region
    pub fn region_size(&self, region: Region) -> Result<u64> {
        let state = self.state.lock();
        Ok(self.validate_handle(&state, region)?.capacity)
    }

    /// Block granularity in bytes
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Usable stream extent in bytes
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// What the recovery scan found when this stream was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Check a region handle against the live allocator state
    fn validate_handle<'a>(
        &self,
        state: &'a RegionAllocator,
        region: Region,
    ) -> Result<&'a crate::alloc::RegionInfo> {
        state
            .get(region.offset)
            .filter(|live| live.generation == region.generation)
            .ok_or(LodeError::StaleHandle {
                offset: region.offset,
                generation: region.generation,
            })
    }
}
