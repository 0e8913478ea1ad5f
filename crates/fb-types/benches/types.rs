//! Benchmarks for datatype encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use criterion::{Criterion, criterion_group, criterion_main};
use fb_types::{ByteOrder, DatatypeCoder, Decimal128};
use std::hint::black_box;

/// Benchmark integer encoding in both byte orders.
fn bench_integers(c: &mut Criterion) {
    let mut group = c.benchmark_group("integer_encode");

    for (name, order) in [("big", ByteOrder::BigEndian), ("little", ByteOrder::LittleEndian)] {
        let coder = DatatypeCoder::new(order);
        group.bench_function(name, |b| {
            b.iter(|| black_box(coder.encode_i64(black_box(1_234_567_890_123))))
        });
    }

    group.finish();
}

/// Benchmark Decimal128 packing and unpacking.
fn bench_decimal128(c: &mut Criterion) {
    let value = Decimal128::from_parts(true, 1_234_567_890_123_456_789_012_345_678_901_234, -20)
        .unwrap();
    let bits = value.to_bits();

    c.bench_function("decimal128_encode", |b| b.iter(|| black_box(value.to_bits())));
    c.bench_function("decimal128_decode", |b| {
        b.iter(|| black_box(Decimal128::from_bits(black_box(bits))))
    });
}

/// Benchmark string decoding through a single-byte charset.
fn bench_strings(c: &mut Criterion) {
    let coder = DatatypeCoder::for_charset(ByteOrder::BigEndian, "WIN1252").unwrap();
    let encoded = coder
        .encode_string("Sample column value with some accented text: café, naïve")
        .unwrap();

    c.bench_function("string_decode_win1252", |b| {
        b.iter(|| black_box(coder.decode_string(Some(&encoded)).unwrap()))
    });
}

criterion_group!(benches, bench_integers, bench_decimal128, bench_strings);
criterion_main!(benches);
