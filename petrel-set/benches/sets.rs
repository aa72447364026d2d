//! Throughput benchmarks for the ordered and split-ordered sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use petrel_set::{OrderedSet, SplitOrderedSet};

fn bench_ordered_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("ordered_set");

    for size in [64u64, 256, 1024].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::new("contains", size),
            size,
            |b, &size| {
                let set: OrderedSet<u64> = OrderedSet::new(1);
                let handle = set.register().unwrap();
                for k in 0..size {
                    handle.insert(k);
                }
                let mut k = 0;
                b.iter(|| {
                    k = (k + 1) % size;
                    black_box(handle.contains(&k));
                });
            },
        );
    }

    group.bench_function("insert_remove", |b| {
        let set: OrderedSet<u64> = OrderedSet::new(1);
        let handle = set.register().unwrap();
        let mut k = 0u64;
        b.iter(|| {
            k = k.wrapping_add(1) % 512;
            handle.insert(k);
            handle.remove(&k);
        });
    });

    group.finish();
}

fn bench_split_ordered_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_ordered_set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_grow", |b| {
        b.iter_with_setup(
            || SplitOrderedSet::<u64>::new(1),
            |set| {
                let handle = set.register().unwrap();
                for k in 0..1024u64 {
                    handle.insert(black_box(k));
                }
                drop(handle);
                set
            },
        );
    });

    group.bench_function("contains_hit", |b| {
        let set: SplitOrderedSet<u64> = SplitOrderedSet::new(1);
        let handle = set.register().unwrap();
        for k in 0..4096u64 {
            handle.insert(k);
        }
        let mut k = 0;
        b.iter(|| {
            k = (k + 1) % 4096;
            black_box(handle.contains(&k));
        });
    });

    group.bench_function("insert_remove", |b| {
        let set: SplitOrderedSet<u64> = SplitOrderedSet::new(1);
        let handle = set.register().unwrap();
        let mut k = 0u64;
        b.iter(|| {
            k = k.wrapping_add(1) % 512;
            handle.insert(k);
            handle.remove(&k);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ordered_set, bench_split_ordered_set);
criterion_main!(benches);
