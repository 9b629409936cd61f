use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use harness::report::{format_lines, parse_markers};
use harness::{Checkpoint, LatencyStats, MeasurementResult, OrderHandle, TimingRecord};

fn completed_record() -> TimingRecord {
    let mut record = TimingRecord::new();
    record.mark(Checkpoint::Start);
    record.mark(Checkpoint::SubmitAck);
    record.mark(Checkpoint::CancelAck);
    record
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("timing_record");

    group.bench_function("mark_three_checkpoints", |b| {
        b.iter(|| black_box(completed_record()))
    });

    let record = completed_record();
    group.bench_function("elapsed", |b| {
        b.iter(|| black_box(record.elapsed(Checkpoint::Start, Checkpoint::SubmitAck)))
    });

    group.finish();
}

fn bench_report(c: &mut Criterion) {
    let outcome = Ok(MeasurementResult {
        handle: OrderHandle {
            order_id: "SIM000001".into(),
            ticket_id: "T1-2330".into(),
        },
        record: completed_record(),
        total_latency_ns: 6_000_000,
        cancel_latency_ns: 1_000_000_000,
    });

    c.bench_function("format_lines", |b| {
        b.iter(|| black_box(format_lines(&outcome, true)))
    });

    let text = format_lines(&outcome, true).join("\n");
    c.bench_function("parse_markers", |b| b.iter(|| black_box(parse_markers(&text))));
}

fn bench_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_stats");

    for &n in [100usize, 1_000, 10_000].iter() {
        let samples: Vec<i64> = (0..n as i64).map(|i| 5_000_000 + (i * 7919) % 2_000_000).collect();
        group.bench_with_input(BenchmarkId::new("from_samples", n), &samples, |b, samples| {
            b.iter(|| black_box(LatencyStats::from_samples(samples.clone())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_report, bench_stats);
criterion_main!(benches);
