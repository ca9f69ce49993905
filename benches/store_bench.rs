use cask::Store;
use criterion::{criterion_group, criterion_main, Criterion};
use once_cell::sync::Lazy;
use rand::prelude::*;
use tempfile::TempDir;

static SEED_VALUES: Lazy<Vec<String>> = Lazy::new(|| {
    let mut seeds = Vec::new();
    for _ in 0..=100 {
        seeds.push(rand::thread_rng().gen_range(0..100_000).to_string());
    }
    seeds
});

// NOTE: These benchmarks are likely not very accurate, but serve as a method
// to get a feel for the write and read paths with criterion.
pub fn store(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();

    let store = Store::open(temp_dir.path()).unwrap();

    c.bench_function("write", |b| {
        b.iter(|| {
            for (i, seed) in SEED_VALUES.iter().enumerate() {
                store
                    .put(i.to_string().as_bytes(), seed.as_bytes())
                    .unwrap();
            }
        })
    });

    c.bench_function("read", |b| {
        b.iter(|| {
            for (i, value) in SEED_VALUES.iter().enumerate() {
                let v = store.get(i.to_string().as_bytes()).unwrap();
                assert_eq!(v, value.as_bytes());
            }
        })
    });
}

criterion_group!(benches, store);
criterion_main!(benches);
