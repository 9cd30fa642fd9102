//! Tests for region allocation
//!
//! These tests verify:
//! - Block alignment and capacity rounding
//! - LIFO reuse of freed regions (the observable allocator contract)
//! - Reuse after freeing an arbitrary subset
//! - OutOfSpace as a recoverable, side-effect-free condition
//! - Stale handle rejection on free

use lodestream::{Config, HeapMap, LodeError, Region, Stream};

// =============================================================================
// Helper Functions
// =============================================================================

const MAP_SIZE: u64 = 4 * 1024 * 1024;
const BLOCK_SIZE: u64 = 4096;

fn open_stream(map_size: u64) -> Stream {
    let config = Config::builder()
        .block_size(BLOCK_SIZE)
        .stream_size(map_size)
        .build();
    Stream::from_map(Box::new(HeapMap::new(map_size)), &config).unwrap()
}

fn allocate_many(stream: &Stream, count: usize, size: u64) -> Vec<Region> {
    (0..count)
        .map(|_| stream.region_allocate(size).unwrap())
        .collect()
}

// =============================================================================
// Alignment & Capacity Tests
// =============================================================================

#[test]
fn test_offsets_are_block_aligned() {
    let stream = open_stream(MAP_SIZE);
    for region in allocate_many(&stream, 8, 1000) {
        assert_eq!(region.offset() % BLOCK_SIZE, 0);
    }
}

#[test]
fn test_capacity_rounds_up_to_block_footprint() {
    let stream = open_stream(MAP_SIZE);
    let region = stream.region_allocate(1).unwrap();
    let capacity = stream.region_size(region).unwrap();

    // Usable capacity is at least the request, and the full footprint
    // (header + capacity) lands on a block multiple.
    assert!(capacity >= 1);
    assert_eq!(
        (lodestream::layout::REGION_HEADER_SIZE + capacity) % BLOCK_SIZE,
        0
    );
}

#[test]
fn test_regions_do_not_overlap() {
    let stream = open_stream(MAP_SIZE);
    let mut regions = allocate_many(&stream, 6, 10_000);
    regions.sort_by_key(|r| r.offset());

    for pair in regions.windows(2) {
        let footprint =
            lodestream::layout::REGION_HEADER_SIZE + stream.region_size(pair[0]).unwrap();
        assert!(pair[0].offset() + footprint <= pair[1].offset());
    }
}

// =============================================================================
// LIFO Reuse Tests
// =============================================================================

#[test]
fn test_lifo_reuse_full_cycle() {
    let stream = open_stream(MAP_SIZE);

    for n in [1usize, 2, 3, 8, 16] {
        let regions = allocate_many(&stream, n, 8192);
        assert_eq!(stream.region_count(), n);

        for region in &regions {
            stream.region_free(*region).unwrap();
        }
        assert_eq!(stream.region_count(), 0);

        // Freed in allocation order, so reallocation returns them reversed.
        let reallocated = allocate_many(&stream, n, 8192);
        let expected: Vec<u64> = regions.iter().rev().map(|r| r.offset()).collect();
        let actual: Vec<u64> = reallocated.iter().map(|r| r.offset()).collect();
        assert_eq!(actual, expected);

        for region in reallocated {
            stream.region_free(region).unwrap();
        }
    }
}

#[test]
fn test_reuse_after_partial_free() {
    let stream = open_stream(MAP_SIZE);

    let regions = allocate_many(&stream, 6, 8192);
    let original = stream.region_count();

    // Free an arbitrary subset, in a deliberately shuffled order.
    let freed_order = [regions[4], regions[1], regions[3]];
    for region in &freed_order {
        stream.region_free(*region).unwrap();
    }
    assert_eq!(stream.region_count(), original - freed_order.len());

    // Reallocating k regions returns them in reverse freeing order.
    for (step, expected) in freed_order.iter().rev().enumerate() {
        let region = stream.region_allocate(8192).unwrap();
        assert_eq!(region.offset(), expected.offset());
        assert_eq!(
            stream.region_count(),
            original - freed_order.len() + step + 1
        );
    }
}

#[test]
fn test_too_small_top_slot_falls_through_to_tail() {
    let stream = open_stream(MAP_SIZE);

    let small = stream.region_allocate(BLOCK_SIZE).unwrap();
    let big = stream.region_allocate(BLOCK_SIZE * 8).unwrap();
    stream.region_free(small).unwrap();

    // The most recently freed slot cannot hold this request, so it comes
    // from the tail without disturbing the free list.
    let big2 = stream.region_allocate(BLOCK_SIZE * 8).unwrap();
    assert!(big2.offset() > big.offset());

    // The small slot is still first in line for a fitting request.
    let small2 = stream.region_allocate(BLOCK_SIZE).unwrap();
    assert_eq!(small2.offset(), small.offset());
}

// =============================================================================
// OutOfSpace Tests
// =============================================================================

#[test]
fn test_out_of_space_is_recoverable() {
    let stream = open_stream(16 * BLOCK_SIZE);

    let mut regions = Vec::new();
    loop {
        match stream.region_allocate(BLOCK_SIZE) {
            Ok(region) => regions.push(region),
            Err(LodeError::OutOfSpace { .. }) => break,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(!regions.is_empty());
    let full_count = stream.region_count();

    // The failure had no side effect: the same request still fails, and
    // the allocated set is intact.
    assert!(matches!(
        stream.region_allocate(BLOCK_SIZE),
        Err(LodeError::OutOfSpace { .. })
    ));
    assert_eq!(stream.region_count(), full_count);

    // Freeing one region makes allocation succeed again, at that offset.
    let freed = regions.pop().unwrap();
    stream.region_free(freed).unwrap();
    let reused = stream.region_allocate(BLOCK_SIZE).unwrap();
    assert_eq!(reused.offset(), freed.offset());
}

#[test]
fn test_oversized_request_fails_cleanly() {
    let stream = open_stream(MAP_SIZE);
    assert!(matches!(
        stream.region_allocate(MAP_SIZE * 2),
        Err(LodeError::OutOfSpace { .. })
    ));
    assert_eq!(stream.region_count(), 0);
}

// =============================================================================
// Stale Handle Tests
// =============================================================================

#[test]
fn test_double_free_rejected() {
    let stream = open_stream(MAP_SIZE);
    let region = stream.region_allocate(8192).unwrap();

    stream.region_free(region).unwrap();
    assert!(matches!(
        stream.region_free(region),
        Err(LodeError::StaleHandle { .. })
    ));
}

#[test]
fn test_handle_from_previous_generation_rejected() {
    let stream = open_stream(MAP_SIZE);
    let old = stream.region_allocate(8192).unwrap();
    stream.region_free(old).unwrap();

    // Same offset, new generation.
    let new = stream.region_allocate(8192).unwrap();
    assert_eq!(new.offset(), old.offset());
    assert_ne!(new.generation(), old.generation());

    assert!(matches!(
        stream.region_free(old),
        Err(LodeError::StaleHandle { .. })
    ));

    // The live handle still works.
    stream.region_free(new).unwrap();
    assert_eq!(stream.region_count(), 0);
}
