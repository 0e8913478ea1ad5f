//! Benchmarks for wire protocol encoding and decoding.

#![allow(clippy::unwrap_used, missing_docs)]

use bytes::{Bytes, BytesMut};
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use fb_protocol::{
    FetchResponse, FetchStatus, GenericResponse, Request, Response, RowData, StatusEntry,
    StatusVector, codes,
    packet::{FRAME_HEADER_SIZE, FrameHeader},
};

fn sample_rows(count: usize) -> Vec<RowData> {
    (0..count)
        .map(|i| {
            RowData::new(vec![
                Some(Bytes::copy_from_slice(&(i as u32).to_be_bytes())),
                Some(Bytes::from(format!("customer-{i:06}"))),
                None,
            ])
        })
        .collect()
}

/// Benchmark frame header encoding.
fn bench_frame_header(c: &mut Criterion) {
    let header = FrameHeader::new(1000);

    c.bench_function("frame_header_encode", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE);
            header.encode(&mut buf);
            black_box(buf)
        })
    });
}

/// Benchmark fetch response decoding with various batch sizes.
fn bench_fetch_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_decode");

    for count in [1usize, 100, 400] {
        let encoded = Response::Fetch(FetchResponse {
            status: FetchStatus::More,
            rows: sample_rows(count),
        })
        .to_bytes();
        group.throughput(Throughput::Bytes(encoded.len() as u64));
        group.bench_function(format!("{count}_rows"), |b| {
            b.iter(|| {
                let mut cursor = encoded.clone();
                black_box(Response::decode(&mut cursor).unwrap())
            })
        });
    }

    group.finish();
}

/// Benchmark status vector decoding inside a generic response.
fn bench_generic_error_decode(c: &mut Criterion) {
    let mut status = StatusVector::from_entry(StatusEntry::error(codes::SQLERR).with_number(-803));
    status.push(StatusEntry::error(codes::NO_DUP).with_string("PK_ORDERS"));
    let encoded = Response::Generic(GenericResponse::failed(status.with_sql_state("23000")))
        .to_bytes();

    c.bench_function("generic_error_decode", |b| {
        b.iter(|| {
            let mut cursor = encoded.clone();
            black_box(Response::decode(&mut cursor).unwrap())
        })
    });
}

/// Benchmark prepare request encoding.
fn bench_prepare_encode(c: &mut Criterion) {
    let request = Request::PrepareStatement {
        transaction: 1,
        statement: 2,
        dialect: 3,
        sql: "SELECT id, name, notes FROM customers WHERE region = ? ORDER BY id".into(),
    };

    c.bench_function("prepare_encode", |b| b.iter(|| black_box(request.to_bytes())));
}

criterion_group!(
    benches,
    bench_frame_header,
    bench_fetch_decode,
    bench_generic_error_decode,
    bench_prepare_encode,
);
criterion_main!(benches);
