//! Benchmarks for LodeStream append and allocation paths

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lodestream::{Config, HeapMap, Stream};

const MAP_SIZE: u64 = 256 * 1024 * 1024;
const REGION_SIZE: u64 = 8 * 1024 * 1024;

fn bench_stream() -> Stream {
    let config = Config::builder().stream_size(MAP_SIZE).build();
    Stream::from_map(Box::new(HeapMap::new(MAP_SIZE)), &config).unwrap()
}

fn append_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for &size in &[64usize, 1024, 16 * 1024] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let stream = bench_stream();
            let mut region = stream.region_allocate(REGION_SIZE).unwrap();
            let payload = vec![0xA5u8; size];
            b.iter(|| {
                if stream.append(region, black_box(&payload)).is_err() {
                    // Region filled up: recycle it and keep appending.
                    stream.region_free(region).unwrap();
                    region = stream.region_allocate(REGION_SIZE).unwrap();
                    stream.append(region, &payload).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn reserve_publish_benchmarks(c: &mut Criterion) {
    c.bench_function("reserve_publish_1k", |b| {
        let stream = bench_stream();
        let mut region = stream.region_allocate(REGION_SIZE).unwrap();
        let payload = vec![0x3Cu8; 1024];
        b.iter(|| {
            let mut reservation = match stream.reserve(region, 1024) {
                Ok(reservation) => reservation,
                Err(_) => {
                    stream.region_free(region).unwrap();
                    region = stream.region_allocate(REGION_SIZE).unwrap();
                    stream.reserve(region, 1024).unwrap()
                }
            };
            reservation.copy_from_slice(black_box(&payload)).unwrap();
            reservation.publish().unwrap();
        });
    });
}

fn allocator_benchmarks(c: &mut Criterion) {
    c.bench_function("region_allocate_free", |b| {
        let stream = bench_stream();
        b.iter(|| {
            let region = stream.region_allocate(black_box(64 * 1024)).unwrap();
            stream.region_free(region).unwrap();
        });
    });
}

criterion_group!(
    benches,
    append_benchmarks,
    reserve_publish_benchmarks,
    allocator_benchmarks
);
criterion_main!(benches);
