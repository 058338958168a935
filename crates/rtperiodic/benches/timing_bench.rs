//! Benchmarks for timestamp arithmetic, clock reads and lateness statistics.

use criterion::{Criterion, criterion_group, criterion_main};
use rtperiodic::LatenessStats;
use rtperiodic::timespec::{Timestamp, add, delta, normalize};
use std::hint::black_box;

fn bench_timestamp_add(c: &mut Criterion) {
    let deadline = Timestamp::new(1_000, 999_999_000);
    let period = Timestamp::from_nanos(1_000_000);

    c.bench_function("timestamp_add", |b| {
        b.iter(|| black_box(add(black_box(deadline), black_box(period), black_box(-250))));
    });
}

fn bench_timestamp_delta(c: &mut Criterion) {
    let a = Timestamp::new(1_000, 500);
    let b_ts = Timestamp::new(1_001, 250);

    c.bench_function("timestamp_delta", |b| {
        b.iter(|| black_box(delta(black_box(a), black_box(b_ts))));
    });
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize", |b| {
        b.iter(|| black_box(normalize(black_box(12), black_box(3_999_999_999))));
    });
}

fn bench_clock_now(c: &mut Criterion) {
    c.bench_function("clock_now", |b| {
        b.iter(|| black_box(rtperiodic::clock::now()));
    });
}

fn bench_lateness_record(c: &mut Criterion) {
    let mut stats = LatenessStats::new();

    c.bench_function("lateness_record", |b| {
        b.iter(|| stats.record(black_box(42_000), false));
    });
}

fn bench_lateness_p99(c: &mut Criterion) {
    let mut stats = LatenessStats::with_capacity(10_000);
    for i in 0..10_000_i64 {
        stats.record(i % 1_000_000, false);
    }

    c.bench_function("lateness_p99", |b| {
        b.iter(|| black_box(stats.percentile_ns(0.99)));
    });
}

criterion_group!(
    benches,
    bench_timestamp_add,
    bench_timestamp_delta,
    bench_normalize,
    bench_clock_now,
    bench_lateness_record,
    bench_lateness_p99
);
criterion_main!(benches);
