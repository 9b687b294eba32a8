//! Benchmarks for the job queue and metadata table hot paths
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use snapshot_postproc::metadata::{MetadataTable, MetadataValue, Rational, MAX_METADATA_ENTRIES};
use snapshot_postproc::pipeline::JobQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("job_queue");
    group.throughput(Throughput::Elements(1));

    let queue = JobQueue::new("bench", |_: u64| {});
    group.bench_function("enqueue_dequeue", |b| {
        let mut i = 0u64;
        b.iter(|| {
            queue.enqueue(black_box(i));
            black_box(queue.dequeue(false));
            i = i.wrapping_add(1);
        });
    });

    group.finish();
}

fn bench_take_first(c: &mut Criterion) {
    let mut group = c.benchmark_group("take_first");

    // Completion matching scans the ongoing queue; depth is usually tiny
    for depth in [1usize, 4, 16, 64].iter() {
        let queue = JobQueue::new("ongoing", |_: u64| {});
        for id in 0..*depth as u64 {
            queue.enqueue(id);
        }
        let last = *depth as u64 - 1;

        group.bench_with_input(BenchmarkId::new("match_tail", depth), depth, |b, _| {
            b.iter(|| {
                let found = queue.take_first(|id| *id == black_box(last));
                if let Some(id) = found {
                    queue.enqueue(id);
                }
            });
        });
    }

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for size in [16usize, 256, 4096].iter() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let queue = JobQueue::new("flush", move |_: u64| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("release_all", size), size, |b, &size| {
            b.iter(|| {
                for id in 0..size as u64 {
                    queue.enqueue(id);
                }
                black_box(queue.flush())
            });
        });
    }

    group.finish();
}

fn bench_metadata_table(c: &mut Criterion) {
    let mut group = c.benchmark_group("metadata_table");

    group.bench_function("build_exif_like", |b| {
        b.iter(|| {
            let mut table = MetadataTable::new();
            for tag in 0..MAX_METADATA_ENTRIES as u32 {
                let value = match tag % 3 {
                    0 => MetadataValue::shorts(&[tag as u16]),
                    1 => MetadataValue::ascii("snapshot-postproc"),
                    _ => MetadataValue::rationals(&[Rational { num: tag, denom: 100 }]),
                };
                if let Ok(value) = value {
                    table.add(0x0100 + tag, value).ok();
                }
            }
            black_box(table.len())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_enqueue_dequeue,
    bench_take_first,
    bench_flush,
    bench_metadata_table,
);
criterion_main!(benches);
