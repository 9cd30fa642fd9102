//! On-Media Layout & Header Codec
//!
//! Pure, stateless translation between raw byte ranges and the typed
//! stream/region/entry headers. No I/O beyond reading and writing the
//! supplied buffers; flushing is the caller's responsibility at its own
//! synchronization points.
//!
//! ## Media Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Stream Header (40 bytes, in the first block)                 │
//! │   Magic: "LODESTRM" (8) | Version: u64 (8)                   │
//! │   BlockSize: u64 (8) | TotalSize: u64 (8)                    │
//! │   CRC32: u32 (4) | Padding (4)                               │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Region Slot (block-aligned, repeated)                        │
//! │ ┌──────────────────────────────────────────────────────────┐ │
//! │ │ Region Header (64 bytes)                                 │ │
//! │ │   Magic: "LSREGION" (8) | State: u64 (8)                 │ │
//! │ │   Generation: u64 (8) | Capacity: u64 (8)                │ │
//! │ │   CommittedOffset: u64 (8) | CRC32: u32 (4) | Pad (20)   │ │
//! │ ├──────────────────────────────────────────────────────────┤ │
//! │ │ Entry Area (Capacity bytes, packed from offset 0)        │ │
//! │ │   [Length: u64][Checksum: u32][Reserved: u32][Payload]   │ │
//! │ │   ... each entry footprint padded to 8 bytes ...         │ │
//! │ └──────────────────────────────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! An entry's checksum covers `generation || length || payload`, so the
//! checksum is simultaneously the commit marker and the guard against
//! leftover entries from a previous allocation of the same offset: bytes
//! written under an older generation can never validate under the current
//! one. Any prefix of bytes up to the last fully-flushed write is
//! independently parseable from these headers alone.

use crate::error::{LodeError, Result};

// =============================================================================
// Format Constants
// =============================================================================

/// Magic bytes identifying a LodeStream mapping
pub const STREAM_MAGIC: [u8; 8] = *b"LODESTRM";

/// Magic bytes at the start of every region slot
pub const REGION_MAGIC: [u8; 8] = *b"LSREGION";

/// Current on-media format version
pub const FORMAT_VERSION: u64 = 1;

/// Stream header size: magic (8) + version (8) + block size (8)
/// + total size (8) + CRC (4) + padding (4)
pub const STREAM_HEADER_SIZE: u64 = 40;

/// Region header size: magic (8) + state (8) + generation (8) + capacity (8)
/// + committed offset (8) + CRC (4) + padding (20)
pub const REGION_HEADER_SIZE: u64 = 64;

/// Entry header size: length (8) + checksum (4) + reserved (4)
pub const ENTRY_HEADER_SIZE: u64 = 16;

/// Entry footprints are padded to this alignment so headers stay
/// word-aligned inside the entry area
pub const ENTRY_ALIGNMENT: u64 = 8;

/// Region state tag: freed, entry area is dead bytes
pub const REGION_STATE_FREE: u64 = 0;

/// Region state tag: live, entry area holds the committed prefix
pub const REGION_STATE_ALLOCATED: u64 = 1;

// =============================================================================
// Alignment Helpers
// =============================================================================

/// Round `value` up to the next multiple of `alignment` (a power of two)
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Full byte footprint of an entry with the given payload length
pub const fn entry_footprint(length: u64) -> u64 {
    align_up(ENTRY_HEADER_SIZE + length, ENTRY_ALIGNMENT)
}

/// Full byte footprint of a region with the given entry-area capacity
pub const fn region_footprint(capacity: u64) -> u64 {
    REGION_HEADER_SIZE + capacity
}

// =============================================================================
// Stream Header
// =============================================================================

/// Decoded stream header (offset 0 of the mapping)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    /// Format version
    pub version: u64,
    /// Block granularity in bytes
    pub block_size: u64,
    /// Total usable stream size in bytes
    pub total_size: u64,
}

impl StreamHeader {
    /// Encode to the on-media byte layout
    pub fn encode(&self) -> [u8; STREAM_HEADER_SIZE as usize] {
        let mut buf = [0u8; STREAM_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&STREAM_MAGIC);
        buf[8..16].copy_from_slice(&self.version.to_le_bytes());
        buf[16..24].copy_from_slice(&self.block_size.to_le_bytes());
        buf[24..32].copy_from_slice(&self.total_size.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..32]);
        buf[32..36].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode and validate a stream header
    ///
    /// Any mismatch here is fatal: without a trusted header there is no safe
    /// way to interpret the rest of the mapping.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < STREAM_HEADER_SIZE as usize {
            return Err(LodeError::CorruptStream(format!(
                "mapping too small for stream header: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..8] != STREAM_MAGIC {
            return Err(LodeError::CorruptStream(
                "stream magic mismatch".to_string(),
            ));
        }
        let stored_crc = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
        let computed_crc = crc32fast::hash(&bytes[0..32]);
        if stored_crc != computed_crc {
            return Err(LodeError::CorruptStream(format!(
                "stream header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored_crc, computed_crc
            )));
        }
        let version = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(LodeError::CorruptStream(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        Ok(Self {
            version,
            block_size: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            total_size: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
        })
    }
}

// =============================================================================
// Region Header
// =============================================================================

/// Region lifecycle state as stored on media
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    Free,
    Allocated,
}

/// Decoded region header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    /// Free or allocated
    pub state: RegionState,
    /// Allocation generation stamp, monotonically increasing stream-wide
    pub generation: u64,
    /// Entry-area capacity in bytes (footprint minus header)
    pub capacity: u64,
    /// Advisory durable append watermark; authoritative recovery state is
    /// always recomputed by walking the entry area
    pub committed_offset: u64,
}

impl RegionHeader {
    /// Encode to the on-media byte layout
    pub fn encode(&self) -> [u8; REGION_HEADER_SIZE as usize] {
        let state = match self.state {
            RegionState::Free => REGION_STATE_FREE,
            RegionState::Allocated => REGION_STATE_ALLOCATED,
        };
        let mut buf = [0u8; REGION_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&REGION_MAGIC);
        buf[8..16].copy_from_slice(&state.to_le_bytes());
        buf[16..24].copy_from_slice(&self.generation.to_le_bytes());
        buf[24..32].copy_from_slice(&self.capacity.to_le_bytes());
        buf[32..40].copy_from_slice(&self.committed_offset.to_le_bytes());
        let crc = crc32fast::hash(&buf[0..40]);
        buf[40..44].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decode a region header
    ///
    /// Returns `None` when the bytes do not form a valid header (magic,
    /// state tag, or checksum mismatch). A scanner treats `None` as
    /// free/unused space, not as corruption to propagate: a torn header
    /// write must look exactly like no allocation at all.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < REGION_HEADER_SIZE as usize {
            return None;
        }
        if bytes[0..8] != REGION_MAGIC {
            return None;
        }
        let stored_crc = u32::from_le_bytes(bytes[40..44].try_into().unwrap());
        if stored_crc != crc32fast::hash(&bytes[0..40]) {
            return None;
        }
        let state = match u64::from_le_bytes(bytes[8..16].try_into().unwrap()) {
            REGION_STATE_FREE => RegionState::Free,
            REGION_STATE_ALLOCATED => RegionState::Allocated,
            _ => return None,
        };
        Some(Self {
            state,
            generation: u64::from_le_bytes(bytes[16..24].try_into().unwrap()),
            capacity: u64::from_le_bytes(bytes[24..32].try_into().unwrap()),
            committed_offset: u64::from_le_bytes(bytes[32..40].try_into().unwrap()),
        })
    }
}

// =============================================================================
// Entry Header
// =============================================================================

/// Decoded entry header (commit status not yet verified)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    /// Payload length in bytes
    pub length: u64,
    /// Stored commit marker: CRC32 over generation, length, and payload
    pub checksum: u32,
}

impl EntryHeader {
    /// Encode to the on-media byte layout
    pub fn encode(&self) -> [u8; ENTRY_HEADER_SIZE as usize] {
        let mut buf = [0u8; ENTRY_HEADER_SIZE as usize];
        buf[0..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }

    /// Decode an entry header
    ///
    /// Returns `None` (torn) if the bytes are not an internally-consistent
    /// record: too short, or the reserved word is non-zero. Commit
    /// verification additionally requires the payload; see
    /// [`decode_committed_entry`].
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < ENTRY_HEADER_SIZE as usize {
            return None;
        }
        if bytes[12..16] != [0u8; 4] {
            return None;
        }
        Some(Self {
            length: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            checksum: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

/// Compute the commit marker for an entry
///
/// Covers the owning region's generation, the payload length, and the
/// payload bytes, in that order.
pub fn entry_checksum(generation: u64, length: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&generation.to_le_bytes());
    hasher.update(&length.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// A committed entry located inside a region's entry area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedEntry {
    /// Offset of the entry header, relative to the entry area start
    pub offset: u64,
    /// Payload length in bytes
    pub length: u64,
    /// Full padded footprint; the next entry begins at `offset + footprint`
    pub footprint: u64,
}

/// Decode the entry at `cursor` within a region's entry area, verifying
/// its commit marker against `generation`
///
/// Returns `None` when the cursor runs past the capacity, the header fails
/// to decode, the declared payload cannot fit in the remaining area, or the
/// checksum does not match. All of these mean "end of valid data here".
/// This single decode path is shared by the recovery scanner and the entry
/// iterator so the two always agree on where valid data ends.
pub fn decode_committed_entry(area: &[u8], generation: u64, cursor: u64) -> Option<CommittedEntry> {
    let capacity = area.len() as u64;
    if cursor + ENTRY_HEADER_SIZE > capacity {
        return None;
    }
    let header = EntryHeader::decode(&area[cursor as usize..])?;
    if header.length > capacity - cursor - ENTRY_HEADER_SIZE {
        return None;
    }
    let payload_start = (cursor + ENTRY_HEADER_SIZE) as usize;
    let payload = &area[payload_start..payload_start + header.length as usize];
    if header.checksum != entry_checksum(generation, header.length, payload) {
        return None;
    }
    Some(CommittedEntry {
        offset: cursor,
        length: header.length,
        footprint: entry_footprint(header.length),
    })
}
