use cellar_pool::{CapacityPool, Config};
use criterion::{criterion_group, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::hint::black_box;

/// Benchmark a cycle of allocating and releasing one cell of a given size.
fn bench_alloc_release(c: &mut Criterion) {
    let pool = CapacityPool::new(Config::new(64, 64 * 1024));
    for size in [64, 1000, 16 * 1024, 100 * 1024] {
        c.bench_function(&format!("{}/pool size={}", module_path!(), size), |b| {
            b.iter(|| {
                let cell = pool.alloc(black_box(size));
                pool.release(cell)
            });
        });
        c.bench_function(&format!("{}/vec size={}", module_path!(), size), |b| {
            b.iter(|| black_box(vec![0u8; black_box(size)]));
        });
    }
}

/// Benchmark allocations of random sizes, holding a few cells at a time.
fn bench_mixed(c: &mut Criterion) {
    for stats in [false, true] {
        let pool = CapacityPool::new(Config::new(64, 64 * 1024).with_stats(stats));
        let mut rng = StdRng::seed_from_u64(0);
        let sizes: Vec<usize> = (0..1024).map(|_| rng.gen_range(0..80 * 1024)).collect();
        c.bench_function(&format!("{}/stats={}", module_path!(), stats), |b| {
            b.iter(|| {
                let mut held = Vec::with_capacity(8);
                for size in &sizes {
                    held.push(pool.make(*size));
                    if held.len() == held.capacity() {
                        for cell in held.drain(..) {
                            pool.release(cell);
                        }
                    }
                }
                for cell in held {
                    pool.release(cell);
                }
            });
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_alloc_release, bench_mixed
}
