use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::prelude::*;
use sparsemap_rs::SparseMap;
use std::collections::HashMap;

fn bench_insert_get_remove_sparsemap(c: &mut Criterion) {
    c.bench_function("sparsemap_insert_get_remove", |b| {
        b.iter(|| {
            let mut m = SparseMap::<u64, u64>::with_capacity(8192);
            for i in 0..50_000 {
                let _ = m.insert(i, i);
            }
            for i in 0..50_000 {
                let _ = m.get(&i);
            }
            for i in 0..50_000 {
                let _ = m.remove(&i);
            }
            black_box(m.len())
        })
    });
}

fn bench_insert_get_remove_hashmap(c: &mut Criterion) {
    c.bench_function("hashmap_insert_get_remove", |b| {
        b.iter(|| {
            let mut m = HashMap::<u64, u64>::with_capacity(8192);
            for i in 0..50_000 {
                m.insert(i, i);
            }
            for i in 0..50_000 {
                let _ = m.get(&i);
            }
            for i in 0..50_000 {
                let _ = m.remove(&i);
            }
            black_box(m.len())
        })
    });
}

fn bench_sparse_lookup_hit_miss(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let mut m = SparseMap::<u64, u64>::with_capacity(100_000);
    let keys: Vec<u64> = (0..100_000u64).map(|_| rng.gen()).collect();
    for &k in &keys {
        let _ = m.insert(k, k);
    }

    c.bench_function("sparsemap_lookup_hit", |b| {
        b.iter(|| {
            let mut found = 0usize;
            for k in keys.iter().step_by(7) {
                if m.get(k).is_some() {
                    found += 1;
                }
            }
            black_box(found)
        })
    });

    c.bench_function("sparsemap_lookup_miss", |b| {
        b.iter(|| {
            let mut found = 0usize;
            for k in 0..20_000u64 {
                if m.get(&k).is_some() {
                    found += 1;
                }
            }
            black_box(found)
        })
    });
}

criterion_group!(
    benches,
    bench_insert_get_remove_sparsemap,
    bench_insert_get_remove_hashmap,
    bench_sparse_lookup_hit_miss
);
criterion_main!(benches);
