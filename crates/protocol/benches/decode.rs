//! Benchmarks for report decoding
//!
//! Decoding runs once per transfer completion on the USB worker threads, so
//! it has to stay well below the device's round-trip time.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use protocol::{InterruptReport, PollAReport, PollBReport, TransferStatus, classify};

fn benchmark_reports(c: &mut Criterion) {
    let mut group = c.benchmark_group("reports");

    let interrupt = [10u8, 20, 30, 40, 50, 60, 0xFF, 0x00];
    group.bench_function("decode_interrupt", |b| {
        b.iter(|| InterruptReport::decode(black_box(&interrupt)))
    });

    let poll = [0b1010_0101u8, 0b0101_1010];
    group.bench_function("decode_poll_a", |b| {
        b.iter(|| PollAReport::decode(black_box(&poll)))
    });
    group.bench_function("decode_poll_b", |b| {
        b.iter(|| PollBReport::decode(black_box(&poll)))
    });

    group.bench_function("classify", |b| {
        b.iter(|| classify(black_box(TransferStatus::Stall)))
    });

    group.finish();
}

criterion_group!(benches, benchmark_reports);
criterion_main!(benches);
