//! Acquire/release hot path benchmarks.
//!
//! Measures reuse of an idle connection, the overflow path, and contended
//! acquire across tasks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use dsnpool::testing::MemoryDriver;
use dsnpool::Pool;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_reuse(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("reuse");

    for (name, descriptors) in [("one_descriptor", 1usize), ("sixteen_descriptors", 16)] {
        let pool = Pool::new(MemoryDriver::new(), 64);
        let keys: Vec<String> = (0..descriptors).map(|i| format!("DSN=bench{i}")).collect();

        // Warm one idle connection per descriptor.
        rt.block_on(async {
            for key in &keys {
                let conn = pool.acquire(key, &[]).await.unwrap();
                conn.release().await;
            }
        });

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("acquire_release", name), |b| {
            let mut i = 0usize;
            b.to_async(&rt).iter(|| {
                let key = &keys[i % keys.len()];
                i += 1;
                let pool = &pool;
                async move {
                    let conn = pool.acquire(black_box(key), &[]).await.unwrap();
                    conn.release().await;
                }
            })
        });

        rt.block_on(pool.shutdown());
    }

    group.finish();
}

fn bench_overflow(c: &mut Criterion) {
    let rt = runtime();
    let pool = Pool::new(MemoryDriver::new(), 0);

    c.bench_function("overflow_open_close", |b| {
        b.to_async(&rt).iter(|| async {
            let conn = pool.acquire(black_box("DSN=overflow"), &[]).await.unwrap();
            conn.release().await;
        })
    });
}

fn bench_contended(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("contended");

    for tasks in [4usize, 16, 64] {
        let pool = Pool::new(MemoryDriver::new(), 8);
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::from_parameter(tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| {
                let pool = pool.clone();
                async move {
                    let handles: Vec<_> = (0..tasks)
                        .map(|t| {
                            let pool = pool.clone();
                            tokio::spawn(async move {
                                let key = format!("DSN=bench{}", t % 4);
                                let conn = pool.acquire(&key, &[]).await.unwrap();
                                conn.release().await;
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.await.unwrap();
                    }
                }
            })
        });
        rt.block_on(pool.shutdown());
    }

    group.finish();
}

criterion_group!(benches, bench_reuse, bench_overflow, bench_contended);
criterion_main!(benches);
