//! Benchmarks for the frame codec
//!
//! Run with: cargo bench

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use wsframe::frame::{OpCode, encode_frame, read_frame};
use wsframe::handshake::compute_accept_token;
use wsframe::mask::apply_mask;

const SIZES: [usize; 6] = [8, 125, 1024, 16384, 65536, 262144];

/// Benchmark mask application
fn bench_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("mask");

    for size in [64, 256, 1024, 4096, 16384, 65536] {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("apply_mask", size), &size, |b, &size| {
            let mut data = vec![0x42u8; size];
            let mask = [0x37, 0xfa, 0x21, 0x3d];

            b.iter(|| {
                apply_mask(black_box(&mut data), black_box(mask));
            });
        });
    }

    group.finish();
}

/// Benchmark frame encoding, masked and unmasked
fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for size in SIZES {
        let payload = vec![0x42u8; size];
        let mut buf = BytesMut::with_capacity(size + 14);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("unmasked", size), &payload, |b, payload| {
            b.iter(|| {
                buf.clear();
                encode_frame(&mut buf, OpCode::Binary, black_box(payload), None);
            });
        });

        group.bench_with_input(BenchmarkId::new("masked", size), &payload, |b, payload| {
            b.iter(|| {
                buf.clear();
                encode_frame(
                    &mut buf,
                    OpCode::Binary,
                    black_box(payload),
                    Some([0x37, 0xfa, 0x21, 0x3d]),
                );
            });
        });
    }

    group.finish();
}

/// Benchmark decoding a masked frame from memory
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();

    for size in SIZES {
        let payload: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Binary, &payload, Some([0x37, 0xfa, 0x21, 0x3d]));
        let wire = buf.freeze();

        group.throughput(Throughput::Bytes(wire.len() as u64));

        group.bench_with_input(BenchmarkId::new("masked", size), &wire, |b, wire| {
            b.iter(|| {
                let mut reader = &wire[..];
                let frame = rt.block_on(read_frame(&mut reader, 1 << 20)).unwrap();
                black_box(frame);
            });
        });
    }

    group.finish();
}

/// Benchmark the handshake accept token derivation
fn bench_accept_token(c: &mut Criterion) {
    c.bench_function("compute_accept_token", |b| {
        b.iter(|| compute_accept_token(black_box("dGhlIHNhbXBsZSBub25jZQ==")));
    });
}

criterion_group!(
    benches,
    bench_mask,
    bench_encode,
    bench_decode,
    bench_accept_token
);
criterion_main!(benches);
