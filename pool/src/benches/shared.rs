use cellar_pool::{Buffer, CapacityPool, Config};
use criterion::{criterion_group, Criterion};
use std::{hint::black_box, io::Read, thread};

/// Benchmark fanning one buffer out to several threads that release it.
fn bench_fan_out(c: &mut Criterion) {
    let pool = CapacityPool::new(Config::default());
    for holders in [2, 8] {
        c.bench_function(&format!("{}/holders={}", module_path!(), holders), |b| {
            b.iter(|| {
                let shared = Buffer::from_slice(&pool, [7u8; 4096]).share();
                shared.ref_add(holders as i64 - 1);
                let handles: Vec<_> = (0..holders)
                    .map(|_| {
                        let holder = shared.handle();
                        thread::spawn(move || holder.release())
                    })
                    .collect();
                drop(shared);
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|released| *released)
                    .count()
            });
        });
    }
}

/// Benchmark acquiring and releasing pooled readers.
fn bench_reader(c: &mut Criterion) {
    let pool = CapacityPool::new(Config::default());
    let shared = Buffer::from_slice(&pool, [1u8; 256]).share();
    c.bench_function(&format!("{}/reader", module_path!()), |b| {
        b.iter(|| {
            let mut reader = shared.reader();
            let mut out = [0u8; 256];
            reader.read_exact(&mut out).unwrap();
            black_box(out);
            reader.release()
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_fan_out, bench_reader
}
