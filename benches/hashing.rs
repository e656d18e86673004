//! Benchmarks for runtime name hashing.
//!
//! Tests hashing throughput for:
//! - Short and long type names in one step
//! - Incremental hashing of namespace and name pieces
//! - The composite hashes used for nested, array and generic types

extern crate aotscope;

use aotscope::metadata::hash::{
    generic_instance_hash, method_hash, method_signature_hash, name_hash, nested_type_hash,
    sz_array_type_hash, NameHashBuilder,
};
use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;

/// Benchmark hashing a short type name.
fn bench_name_hash_short(c: &mut Criterion) {
    c.bench_function("hash_name_short", |b| {
        b.iter(|| black_box(name_hash(black_box("System.Int32"))));
    });
}

/// Benchmark hashing a long, generic-heavy type name.
fn bench_name_hash_long(c: &mut Criterion) {
    let name = "System.Collections.Generic.Dictionary`2+ValueCollection+Enumerator";

    let mut group = c.benchmark_group("hash_name_long");
    group.throughput(Throughput::Bytes(name.len() as u64));
    group.bench_function("single", |b| {
        b.iter(|| black_box(name_hash(black_box(name))));
    });
    group.finish();
}

/// Benchmark building a qualified name from namespace pieces.
fn bench_name_hash_incremental(c: &mut Criterion) {
    let pieces = ["System", ".", "Collections", ".", "Generic", ".", "List`1"];

    c.bench_function("hash_name_incremental", |b| {
        b.iter(|| {
            let mut builder = NameHashBuilder::new();
            for piece in black_box(&pieces) {
                builder.append(piece);
            }
            black_box(builder.finish())
        });
    });
}

/// Benchmark the composite hashes computed for every resolved type and method.
fn bench_composite_hashes(c: &mut Criterion) {
    let outer = name_hash("MyNs.Outer");
    let inner = name_hash("Inner");
    let arguments = [name_hash("System.String"), name_hash("System.Int32")];

    c.bench_function("hash_nested", |b| {
        b.iter(|| black_box(nested_type_hash(black_box(outer), black_box(inner))));
    });
    c.bench_function("hash_sz_array", |b| {
        b.iter(|| black_box(sz_array_type_hash(black_box(outer))));
    });
    c.bench_function("hash_generic_instance", |b| {
        b.iter(|| black_box(generic_instance_hash(black_box(outer), black_box(&arguments))));
    });
    c.bench_function("hash_method", |b| {
        b.iter(|| {
            let signature = method_signature_hash(black_box(inner), black_box(&arguments));
            black_box(method_hash(outer, signature))
        });
    });
}

criterion_group!(
    benches,
    bench_name_hash_short,
    bench_name_hash_long,
    bench_name_hash_incremental,
    bench_composite_hashes,
);
criterion_main!(benches);
