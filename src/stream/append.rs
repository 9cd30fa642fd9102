//! Append / Reserve-Publish Engine
//!
//! Writes entries into a region with strict durability ordering. Two
//! forms: a single-call [`Stream::append`], and a decoupled
//! [`Stream::reserve`] + [`Reservation::publish`] pair that lets a caller
//! gather payload bytes from several sources before committing.
//!
//! ## Durability ordering
//!
//! Publish flushes and drains the payload range *before* the entry header
//! carrying the validity marker is written and flushed. A crash at any
//! point therefore leaves either a fully committed entry or a torn one
//! that recovery and iteration treat as the end of valid data, never a
//! "valid" entry over garbage payload.

use tracing::trace;

use crate::error::{LodeError, Result};
use crate::layout::{entry_checksum, entry_footprint, EntryHeader, ENTRY_HEADER_SIZE, REGION_HEADER_SIZE};
use crate::stream::{Entry, Region, Stream};

impl Stream {
    /// Append `payload` to `region` as one committed entry
    ///
    /// Equivalent to reserve, copy, publish. Fails with
    /// [`LodeError::InsufficientSpace`] when the region's remaining
    /// capacity cannot hold the entry's footprint; that failure has no
    /// durable side effect and leaves the append cursor unchanged.
    pub fn append(&self, region: Region, payload: &[u8]) -> Result<Entry> {
        let mut reservation = self.reserve(region, payload.len() as u64)?;
        reservation.copy_from_slice(payload)?;
        reservation.publish()
    }

    /// Claim space for an entry of `length` payload bytes in `region`
    ///
    /// Atomically advances the region's append cursor by the entry's full
    /// footprint and returns a one-shot [`Reservation`] over the claimed
    /// bytes. Concurrent reservations on the same region claim disjoint
    /// ranges and may be filled and published independently, but entries
    /// are laid out in reservation order: an unpublished reservation holds
    /// back readers of everything after it until it publishes (or until a
    /// reopen truncates it).
    pub fn reserve(&self, region: Region, length: u64) -> Result<Reservation<'_>> {
        let footprint = entry_footprint(length);

        let mut state = self.state.lock();
        let live = state
            .get_mut(region.offset())
            .filter(|live| live.generation == region.generation())
            .ok_or(LodeError::StaleHandle {
                offset: region.offset(),
                generation: region.generation(),
            })?;

        let remaining = live.capacity - live.append_offset;
        if footprint > remaining {
            return Err(LodeError::InsufficientSpace {
                requested: footprint,
                remaining,
            });
        }

        let relative = live.append_offset;
        live.append_offset += footprint;
        drop(state);

        trace!(
            region = region.offset(),
            offset = relative,
            length,
            "reserved entry space"
        );

        Ok(Reservation {
            stream: self,
            region,
            header_offset: region.offset() + REGION_HEADER_SIZE + relative,
            length,
        })
    }
}

/// A one-shot claim on entry space, consumed by [`publish`](Self::publish)
///
/// The reservation is the only way to commit an entry, and committing
/// consumes it, so double-publish and publish-without-reserve are
/// unrepresentable. Dropping an unpublished reservation abandons the
/// claimed span: it stays torn (invisible to readers) and is reclaimed
/// when the region is freed or the stream is reopened.
#[must_use = "a reservation commits nothing until published"]
pub struct Reservation<'s> {
    stream: &'s Stream,
    region: Region,
    /// Absolute offset of the entry header slot
    header_offset: u64,
    /// Reserved payload length in bytes
    length: u64,
}

impl<'s> Reservation<'s> {
    /// Reserved payload length in bytes
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Absolute offset the entry header will occupy once published
    pub fn offset(&self) -> u64 {
        self.header_offset
    }

    /// The region this reservation claims space in
    pub fn region(&self) -> Region {
        self.region
    }

    /// Copy `data` into the claimed span starting at payload offset
    /// `offset`
    ///
    /// May be called repeatedly to gather the payload piecewise. The bytes
    /// are not durable, and the entry not visible, until
    /// [`publish`](Self::publish).
    pub fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.is_none() || end.unwrap() > self.length {
            return Err(LodeError::InvalidArgument(format!(
                "write of {} bytes at offset {} overruns reservation of {} bytes",
                data.len(),
                offset,
                self.length
            )));
        }
        self.stream
            .map
            .write(self.header_offset + ENTRY_HEADER_SIZE + offset, data);
        Ok(())
    }

    /// Copy a complete payload into the claimed span
    ///
    /// `data` must be exactly the reserved length.
    pub fn copy_from_slice(&mut self, data: &[u8]) -> Result<()> {
        if data.len() as u64 != self.length {
            return Err(LodeError::InvalidArgument(format!(
                "payload of {} bytes does not match reservation of {} bytes",
                data.len(),
                self.length
            )));
        }
        self.write_at(0, data)
    }

    /// Durably commit the entry
    ///
    /// Flushes and drains the payload, then writes, flushes, and drains
    /// the entry header with its validity marker, in that order, so the
    /// marker can never become durable ahead of the bytes it vouches for.
    pub fn publish(self) -> Result<Entry> {
        let payload_offset = self.header_offset + ENTRY_HEADER_SIZE;

        if self.length > 0 {
            self.stream.map.flush(payload_offset, self.length)?;
            self.stream.map.drain()?;
        }

        let payload = self.stream.map.slice(payload_offset, self.length);
        let header = EntryHeader {
            length: self.length,
            checksum: entry_checksum(self.region.generation(), self.length, payload),
        };
        self.stream.map.write(self.header_offset, &header.encode());
        self.stream.map.flush(self.header_offset, ENTRY_HEADER_SIZE)?;
        self.stream.map.drain()?;

        trace!(
            region = self.region.offset(),
            offset = self.header_offset,
            length = self.length,
            "published entry"
        );

        Ok(Entry {
            region: self.region,
            offset: self.header_offset,
            length: self.length,
        })
    }
}
