//! # LodeStream
//!
//! A log-structured, append-only stream store for byte-addressable mapped
//! memory, with:
//! - Independently allocatable regions with LIFO free-slot reuse
//! - Atomic append and two-phase reserve/publish entry writes
//! - Crash recovery that rebuilds all state by re-scanning the mapping
//! - Torn-write tolerance: a partial entry is the end of data, not an error
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Callers                               │
//! │        (allocate / append / reserve+publish / iterate)       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Stream                                │
//! │        (recovery at open, handle validation, close)          │
//! └──────┬──────────────────┬───────────────────────┬───────────┘
//!        │                  │                       │
//!        ▼                  ▼                       ▼
//! ┌─────────────┐    ┌─────────────┐        ┌─────────────┐
//! │  Allocator  │    │   Append    │        │  Iterators  │
//! │ (free list, │    │  (reserve/  │        │  (regions,  │
//! │  tail, gen) │    │   publish)  │        │   entries)  │
//! └──────┬──────┘    └──────┬──────┘        └──────┬──────┘
//!        │                  │                      │
//!        └──────────┬───────┴──────────────────────┘
//!                   ▼
//!            ┌─────────────┐         ┌──────────────────┐
//!            │   Layout    │ ──────▶ │   DurableMap     │
//!            │   (codec)   │         │ (flush + drain)  │
//!            └─────────────┘         └──────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use lodestream::{Config, HeapMap, Stream};
//!
//! let config = Config::builder().stream_size(1 << 20).build();
//! let stream = Stream::from_map(Box::new(HeapMap::new(1 << 20)), &config)?;
//!
//! let region = stream.region_allocate(64 * 1024)?;
//! stream.append(region, b"first entry")?;
//!
//! // Gather a payload piecewise, then commit it atomically.
//! let mut reservation = stream.reserve(region, 10)?;
//! reservation.write_at(0, b"second")?;
//! reservation.write_at(6, b" try")?;
//! reservation.publish()?;
//!
//! for entry in stream.entries(region)? {
//!     println!("{} bytes at {}", entry.length(), entry.offset());
//! }
//! # Ok::<(), lodestream::LodeError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

mod alloc;
pub mod layout;
pub mod map;
mod stream;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use config::Config;
pub use error::{LodeError, Result};
pub use map::{DurableMap, FileMap, HeapMap};
pub use stream::{
    Entry, EntryIterator, RecoveryReport, Region, RegionIterator, Reservation, Stream,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of LodeStream
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
