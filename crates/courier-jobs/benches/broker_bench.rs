//! Broker and status store throughput benchmarks
//!
//! Measures the in-memory broker hand-off and delayed-job promotion.

use chrono::Utc;
use courier_jobs::{
    InMemoryBackend, InMemoryStatusStore, JobBackend, JobRecord, JobRequest, Progress, StatusStore,
};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

fn request(id: usize, delay_ms: i64) -> JobRequest {
    let now = Utc::now();
    JobRequest {
        id: id.to_string(),
        name: "bench".to_string(),
        payload: serde_json::json!({"n": id}),
        created_at: now,
        ready_at: now + chrono::Duration::milliseconds(delay_ms),
    }
}

/// Benchmark push followed by pop of ready jobs
fn bench_ready_handoff(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("ready_handoff");

    for size in [10usize, 100, 1000] {
        group.bench_function(format!("push_pop_{}", size), |b| {
            b.iter(|| {
                runtime.block_on(async {
                    let backend = InMemoryBackend::new();
                    for id in 0..size {
                        backend.push(request(id, 0)).await.unwrap();
                    }
                    while let Some(job) = backend.pop().await.unwrap() {
                        black_box(job);
                    }
                })
            })
        });
    }

    group.finish();
}

/// Benchmark promotion of held jobs into the ready queue
fn bench_promotion(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("promotion");

    group.bench_function("promote_1000", |b| {
        b.iter_batched(
            || {
                let backend = InMemoryBackend::new();
                runtime.block_on(async {
                    for id in 0..1000 {
                        backend.push(request(id, 60_000 + id as i64)).await.unwrap();
                    }
                });
                backend
            },
            |backend| {
                runtime.block_on(async {
                    let later = Utc::now() + chrono::Duration::hours(1);
                    black_box(backend.promote_due(later).await.unwrap())
                })
            },
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

/// Benchmark progress writes into the status store
fn bench_status_writes(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStatusStore::new();
    let record = JobRecord::pending(&request(0, 0));

    c.bench_function("status_progress_write", |b| {
        let mut step = 0u64;
        b.iter(|| {
            step += 1;
            let next = record.advanced(Progress::new(step, u64::MAX), "Loading");
            runtime.block_on(store.put(black_box(next))).unwrap();
        })
    });
}

criterion_group!(benches, bench_ready_handoff, bench_promotion, bench_status_writes);
criterion_main!(benches);
