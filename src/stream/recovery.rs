//! Recovery Scanner
//!
//! Runs once when an existing mapping is opened and reconstructs the
//! allocator's entire state purely from persisted bytes. Nothing in memory
//! survives a restart, so the scan trusts only what it can decode:
//!
//! - a byte range whose region header fails to decode is unused space:
//!   the scan advances one block and keeps probing (this also makes a torn
//!   allocate look exactly like no allocate at all);
//! - a FREE region is recorded on the free list in scan order, which fixes
//!   a deterministic initial LIFO order across restarts;
//! - an ALLOCATED region has its entry area walked from offset 0, and the
//!   durable append offset lands on the first torn entry; reservation
//!   progress that never published is truncated, never surfaced as an
//!   error.
//!
//! The only fatal condition is an unreadable stream header, and that is
//! rejected before this scan starts.

use tracing::{debug, warn};

use crate::alloc::RegionAllocator;
use crate::layout::{
    decode_committed_entry, region_footprint, RegionHeader, RegionState, ENTRY_HEADER_SIZE,
    REGION_HEADER_SIZE,
};
use crate::map::DurableMap;

/// What a recovery scan found
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Regions found ALLOCATED
    pub regions_allocated: usize,
    /// Regions found FREE (available for reuse)
    pub regions_free: usize,
    /// Committed entries across all allocated regions
    pub entries_recovered: u64,
    /// Allocated regions whose entry walk ended on a torn entry rather
    /// than clean unwritten space
    pub regions_truncated: usize,
}

/// Walk the mapped extent and rebuild allocator state
pub(crate) fn scan(
    map: &dyn DurableMap,
    block_size: u64,
    total_size: u64,
) -> (RegionAllocator, RecoveryReport) {
    let mut allocator = RegionAllocator::new(block_size, total_size);
    let mut report = RecoveryReport::default();

    let mut offset = block_size;
    while offset + REGION_HEADER_SIZE <= total_size {
        let header = match RegionHeader::decode(map.slice(offset, REGION_HEADER_SIZE)) {
            Some(header) => header,
            None => {
                offset += block_size;
                continue;
            }
        };

        let footprint = region_footprint(header.capacity);
        if footprint % block_size != 0 || offset + footprint > total_size {
            // A checksummed header with an impossible extent cannot be
            // trusted; treat the block as unused space like any other
            // undecodable range.
            warn!(offset, capacity = header.capacity, "implausible region header skipped");
            offset += block_size;
            continue;
        }

        match header.state {
            RegionState::Free => {
                allocator.insert_free(offset, header.generation, header.capacity);
                report.regions_free += 1;
            }
            RegionState::Allocated => {
                let area = map.slice(offset + REGION_HEADER_SIZE, header.capacity);
                let mut cursor = 0u64;
                let mut entries = 0u64;
                while let Some(entry) = decode_committed_entry(area, header.generation, cursor) {
                    cursor = entry.offset + entry.footprint;
                    entries += 1;
                }

                if is_torn_tail(area, cursor) {
                    report.regions_truncated += 1;
                    debug!(
                        offset,
                        durable_append_offset = cursor,
                        "truncated unpublished tail"
                    );
                }

                allocator.insert_allocated(offset, header.generation, header.capacity, cursor);
                report.regions_allocated += 1;
                report.entries_recovered += entries;
            }
        }

        offset += footprint;
    }

    (allocator, report)
}

/// Distinguish a clean end of data from a torn one, for reporting only
///
/// After the last committed entry, untouched space reads as a zeroed (or
/// absent) header slot; any other byte pattern means an entry was being
/// written there when the crash hit. Either way the durable append offset
/// is the same; this only decides whether the report counts a truncation.
fn is_torn_tail(area: &[u8], cursor: u64) -> bool {
    let capacity = area.len() as u64;
    if cursor >= capacity {
        return false;
    }
    let probe_end = (cursor + ENTRY_HEADER_SIZE).min(capacity);
    area[cursor as usize..probe_end as usize]
        .iter()
        .any(|&byte| byte != 0)
}
