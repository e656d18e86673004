//! Benchmarks for heap reconstruction and heap scanning.
//!
//! Tests performance of:
//! - Rehydrating a stream of mixed copy, zero-fill and relocation commands
//! - Finding a type descriptor by hash in a large heap
//! - Collecting string objects from a large heap

extern crate aotscope;

use std::{hint::black_box, sync::Arc};

use aotscope::{
    image::{address::AddressSpace, address::Heap, header::SectionInfo, FlatImage, PointerWidth},
    runtime::{rehydrate::rehydrate, StructuralScanner},
    AnalysisOptions,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};

const STREAM: u64 = 0x1000;
const HEAP: u64 = 0x10_0000;
const OBJECTS: usize = 4096;

/// A stream reconstructing `OBJECTS` 32-byte objects, each: 8 copied bytes, a pointer
/// relocation through cell 0, and 16 zero bytes.
fn build_stream() -> (FlatImage, SectionInfo) {
    let mut stream = ((HEAP - STREAM) as i32).to_le_bytes().to_vec();
    for index in 0..OBJECTS {
        stream.push(8 << 3);
        stream.extend_from_slice(&(index as u64).to_le_bytes());
        stream.push(3);
        stream.push((16 << 3) | 1);
    }

    let end = STREAM + stream.len() as u64;
    let mut data = stream;
    data.extend_from_slice(&((0x2000 - end as i64) as i32).to_le_bytes());
    data.resize(data.len() + 0x10, 0);

    let image = FlatImage::new(STREAM, data, PointerWidth::Eight);
    let section = SectionInfo {
        id: 207,
        flags: 1,
        start: STREAM,
        end,
    };
    (image, section)
}

/// Benchmark reconstructing a 128 KiB heap.
fn bench_rehydrate(c: &mut Criterion) {
    let (image, section) = build_stream();
    let space = AddressSpace::new(Arc::new(image));

    let mut group = c.benchmark_group("rehydrate");
    group.throughput(Throughput::Bytes((OBJECTS * 32) as u64));
    group.bench_function("mixed_commands", |b| {
        b.iter(|| black_box(rehydrate(black_box(&space), black_box(&section)).unwrap()));
    });
    group.finish();
}

/// A heap of padding with one string marker and a run of string objects near the end.
fn build_heap() -> AddressSpace {
    let string_type = 0x7_0040u64;
    let mut data = vec![0u8; 1 << 20];

    let mut tail = Vec::new();
    let marker = AnalysisOptions::default().string_marker;
    for text in std::iter::once(marker.as_str()).chain(["alpha", "beta", "gamma"]) {
        let units: Vec<u16> = text.encode_utf16().collect();
        tail.extend_from_slice(&string_type.to_le_bytes());
        tail.extend_from_slice(&(units.len() as i32).to_le_bytes());
        for unit in units {
            tail.extend_from_slice(&unit.to_le_bytes());
        }
        tail.resize(tail.len().div_ceil(8) * 8, 0);
    }

    let start = data.len() - tail.len();
    data[start..].copy_from_slice(&tail);

    let image = FlatImage::zeroed(0x1000, 0x100, PointerWidth::Eight);
    AddressSpace::new(Arc::new(image)).with_heap(Heap::new(HEAP, data))
}

/// Benchmark the descriptor and string scans over a 1 MiB heap.
fn bench_scanner(c: &mut Criterion) {
    let space = build_heap();
    let options = AnalysisOptions::default();
    let scanner = StructuralScanner::new(&space, &options);

    let mut group = c.benchmark_group("scanner");
    group.throughput(Throughput::Bytes(1 << 20));
    group.bench_function("descriptor_miss", |b| {
        b.iter(|| black_box(scanner.find_type_descriptor(black_box(0x1234_5678))));
    });
    group.bench_function("strings", |b| {
        b.iter(|| black_box(scanner.scan_strings()));
    });
    group.finish();
}

criterion_group!(benches, bench_rehydrate, bench_scanner);
criterion_main!(benches);
