use criterion::{black_box, criterion_group, criterion_main, Criterion};
use geocache::MemoryCache;

const CACHE_SIZE: u64 = 10_000;

fn populated_cache() -> MemoryCache<u64, u64> {
    let cache = MemoryCache::new(CACHE_SIZE, CACHE_SIZE);
    for i in 0..CACHE_SIZE {
        cache.add(i, i, 1);
    }
    cache
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("MemoryCache");

    let cache = populated_cache();
    group.bench_function("get hit", |b| {
        b.iter(|| {
            for i in 0..100u64 {
                black_box(cache.get(&(i % CACHE_SIZE)));
            }
        });
    });

    let cache = populated_cache();
    group.bench_function("get miss", |b| {
        b.iter(|| {
            for i in 0..100u64 {
                black_box(cache.get(&(i + CACHE_SIZE)));
            }
        });
    });

    let cache = populated_cache();
    group.bench_function("contains (no recency update)", |b| {
        b.iter(|| {
            for i in 0..100u64 {
                black_box(cache.contains(&(i % CACHE_SIZE)));
            }
        });
    });

    group.bench_function("add at capacity (forces eviction)", |b| {
        let cache: MemoryCache<u64, u64> = MemoryCache::new(1_000, 800);
        for i in 0..1_000u64 {
            cache.add(i, i, 1);
        }
        let mut next = 1_000u64;
        b.iter(|| {
            cache.add(next, next, 1);
            next += 1;
        });
    });

    group.bench_function("overwrite existing key", |b| {
        let cache = populated_cache();
        let mut i = 0u64;
        b.iter(|| {
            cache.add(i % CACHE_SIZE, i, 1);
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
