// Criterion benchmarks for wirecall-metrics
//
// Run benchmarks with:
//   cargo bench -p wirecall-metrics

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::time::Instant;
use wirecall_metrics::{MetricsSink, TransportMetrics};

fn bench_transport_events(c: &mut Criterion) {
    let mut group = c.benchmark_group("transport_events");

    let metrics = TransportMetrics::new();

    group.bench_function("message_sent", |b| {
        b.iter(|| metrics.message_sent(black_box(256)));
    });

    group.bench_function("duplicate_discarded", |b| {
        b.iter(|| metrics.duplicate_discarded(black_box(17)));
    });

    group.finish();
}

fn bench_invocation_completed(c: &mut Criterion) {
    let mut group = c.benchmark_group("invocation_completed");

    let metrics = TransportMetrics::new();
    let methods = ["Add", "Subtract", "Multiply", "Divide", "Echo"];

    group.bench_function("single_method", |b| {
        b.iter(|| {
            metrics.invocation_completed(black_box("Add"), black_box(Instant::now()), black_box(true));
        });
    });

    group.bench_function("five_methods", |b| {
        b.iter(|| {
            for method in &methods {
                metrics.invocation_completed(black_box(method), black_box(Instant::now()), black_box(true));
            }
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let metrics = TransportMetrics::new();
    for i in 0..100 {
        metrics.invocation_completed(&format!("method_{}", i), Instant::now(), true);
    }

    c.bench_function("snapshot_100_methods", |b| {
        b.iter(|| black_box(metrics.snapshot()));
    });
}

criterion_group!(
    benches,
    bench_transport_events,
    bench_invocation_completed,
    bench_snapshot
);
criterion_main!(benches);
