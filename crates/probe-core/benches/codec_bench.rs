//! Criterion benchmarks for the probe frame codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package probe-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use probe_core::{decode_frame, encode_frame, keepalive_frame};

/// Data sizes seen in practice: keepalive, a short command, a full datagram.
const SIZES: [usize; 3] = [1, 64, 4000];

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for size in SIZES {
        let data = vec![0x5Au8; size];
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            b.iter(|| encode_frame(black_box(7), black_box(1), black_box(data)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for size in SIZES {
        let bytes = encode_frame(7, 1, &vec![0x5Au8; size]);
        group.bench_with_input(BenchmarkId::from_parameter(size), &bytes, |b, bytes| {
            b.iter(|| decode_frame(black_box(bytes)).map(|f| f.data.len()))
        });
    }
    group.finish();
}

fn bench_keepalive(c: &mut Criterion) {
    c.bench_function("keepalive_frame", |b| b.iter(keepalive_frame));
}

criterion_group!(benches, bench_encode, bench_decode, bench_keepalive);
criterion_main!(benches);
