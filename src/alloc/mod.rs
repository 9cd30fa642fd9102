//! Region Allocator
//!
//! In-memory bookkeeping of which byte ranges of the stream are free,
//! allocated, or still unclaimed tail space. This state is a derived cache:
//! it is rebuilt from the mapped bytes on every open and never persisted
//! itself; the source of truth is always what is currently decodable from
//! the media.
//!
//! ## Reuse policy
//!
//! Freed region slots go on a LIFO free list: the most recently freed
//! region is the next one handed out, provided its capacity satisfies the
//! request; otherwise allocation falls through to carving a fresh region
//! from the unallocated tail. The LIFO order is directly observable by
//! callers (free O1..On, reallocate, get On..O1 back) and is part of the
//! allocator's contract.
//!
//! All methods here are plain state transitions; durable header writes and
//! the mutual exclusion protecting this structure live in the stream.

use std::collections::BTreeMap;

use crate::layout::{region_footprint, REGION_HEADER_SIZE};

// =============================================================================
// State Records
// =============================================================================

/// A previously freed region slot available for reuse
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeSlot {
    /// Block-aligned offset of the region header
    pub offset: u64,
    /// Entry-area capacity the slot was created with (fixed for its lifetime)
    pub capacity: u64,
}

/// Runtime state of one allocated region
#[derive(Debug)]
pub(crate) struct RegionInfo {
    /// Generation stamp written in the region header
    pub generation: u64,
    /// Entry-area capacity in bytes
    pub capacity: u64,
    /// Append cursor relative to the entry area start; covers committed
    /// entries plus outstanding reservations
    pub append_offset: u64,
}

/// Placement decision returned by [`RegionAllocator::allocate`]
#[derive(Debug, Clone, Copy)]
pub(crate) struct Placement {
    pub offset: u64,
    pub capacity: u64,
    pub generation: u64,
    /// True when a freed slot was reused rather than tail space carved
    pub reused: bool,
}

// =============================================================================
// Region Allocator
// =============================================================================

pub(crate) struct RegionAllocator {
    /// LIFO free list; push and pop at the back
    free_list: Vec<FreeSlot>,
    /// Allocated regions keyed by offset (ascending iteration order)
    regions: BTreeMap<u64, RegionInfo>,
    /// First never-allocated byte; fresh regions are carved here
    tail: u64,
    /// End of the usable stream extent
    limit: u64,
    /// Next generation stamp to hand out; always greater than any stamp
    /// persisted anywhere in the stream
    next_generation: u64,
}

impl RegionAllocator {
    /// Create an empty allocator covering `[tail, limit)`
    pub fn new(tail: u64, limit: u64) -> Self {
        Self {
            free_list: Vec::new(),
            regions: BTreeMap::new(),
            tail,
            limit,
            next_generation: 1,
        }
    }

    // -------------------------------------------------------------------------
    // Allocation
    // -------------------------------------------------------------------------

    /// Claim a region with the given footprint (header + capacity, block
    /// aligned by the caller)
    ///
    /// Tries the most recently freed slot first; if its capacity does not
    /// satisfy the request the free list is left untouched and a fresh
    /// region is carved from the tail. Returns `None` when neither fits.
    pub fn allocate(&mut self, footprint: u64) -> Option<Placement> {
        let needed_capacity = footprint - REGION_HEADER_SIZE;

        if let Some(top) = self.free_list.last().copied() {
            if top.capacity >= needed_capacity {
                self.free_list.pop();
                let generation = self.bump_generation();
                self.regions.insert(
                    top.offset,
                    RegionInfo {
                        generation,
                        capacity: top.capacity,
                        append_offset: 0,
                    },
                );
                return Some(Placement {
                    offset: top.offset,
                    capacity: top.capacity,
                    generation,
                    reused: true,
                });
            }
        }

        if footprint <= self.limit - self.tail {
            let offset = self.tail;
            let capacity = footprint - REGION_HEADER_SIZE;
            let generation = self.bump_generation();
            self.tail += footprint;
            self.regions.insert(
                offset,
                RegionInfo {
                    generation,
                    capacity,
                    append_offset: 0,
                },
            );
            return Some(Placement {
                offset,
                capacity,
                generation,
                reused: false,
            });
        }

        None
    }

    /// Release an allocated region and push its slot on the free list
    ///
    /// The caller has already validated the handle against [`get`](Self::get).
    pub fn free(&mut self, offset: u64) {
        let state = self
            .regions
            .remove(&offset)
            .expect("free of untracked region");
        self.free_list.push(FreeSlot {
            offset,
            capacity: state.capacity,
        });
    }

    // -------------------------------------------------------------------------
    // Recovery Insertion
    // -------------------------------------------------------------------------

    /// Record a region found ALLOCATED on media during the recovery scan
    pub fn insert_allocated(&mut self, offset: u64, generation: u64, capacity: u64, append_offset: u64) {
        self.observe(offset, generation, capacity);
        self.regions.insert(
            offset,
            RegionInfo {
                generation,
                capacity,
                append_offset,
            },
        );
    }

    /// Record a region found FREE on media during the recovery scan
    ///
    /// Scan order (ascending offsets) establishes the initial LIFO order:
    /// the highest-offset free region is reused first after reopen.
    pub fn insert_free(&mut self, offset: u64, generation: u64, capacity: u64) {
        self.observe(offset, generation, capacity);
        self.free_list.push(FreeSlot { offset, capacity });
    }

    fn observe(&mut self, offset: u64, generation: u64, capacity: u64) {
        self.next_generation = self.next_generation.max(generation + 1);
        self.tail = self.tail.max(offset + region_footprint(capacity));
    }

    // -------------------------------------------------------------------------
    // Lookup & Diagnostics
    // -------------------------------------------------------------------------

    /// Runtime state of the allocated region at `offset`, if any
    pub fn get(&self, offset: u64) -> Option<&RegionInfo> {
        self.regions.get(&offset)
    }

    /// Mutable runtime state of the allocated region at `offset`, if any
    pub fn get_mut(&mut self, offset: u64) -> Option<&mut RegionInfo> {
        self.regions.get_mut(&offset)
    }

    /// First allocated region with offset strictly greater than `after`,
    /// or the lowest-offset region when `after` is `None`
    pub fn next_allocated(&self, after: Option<u64>) -> Option<(u64, u64)> {
        let mut range = match after {
            Some(offset) => self.regions.range((
                std::ops::Bound::Excluded(offset),
                std::ops::Bound::Unbounded,
            )),
            None => self.regions.range(..),
        };
        range
            .next()
            .map(|(&offset, state)| (offset, state.generation))
    }

    /// Number of currently allocated regions
    pub fn count_allocated(&self) -> usize {
        self.regions.len()
    }

    /// Offsets and cursors of all allocated regions, ascending
    pub fn iter_allocated(&self) -> impl Iterator<Item = (u64, &RegionInfo)> {
        self.regions.iter().map(|(&offset, state)| (offset, state))
    }

    /// Bytes still available for carving at the tail
    pub fn tail_available(&self) -> u64 {
        self.limit - self.tail
    }

    fn bump_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }
}
