//! Throughput benchmarks for hazard-pointer protection and reclamation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use petrel::{Atomic, HazardRegistry, Shared};
use std::sync::atomic::Ordering;

fn bench_protect(c: &mut Criterion) {
    let mut group = c.benchmark_group("protect");

    let registry = HazardRegistry::new(1);
    let session = registry.register().unwrap();
    let src = Atomic::new(Box::into_raw(Box::new(0u64)));

    group.bench_function("protect_clear", |b| {
        b.iter(|| {
            let ptr = session.protect(&src, 0);
            black_box(ptr);
            session.clear();
        });
    });

    group.bench_function("raw_load", |b| {
        b.iter(|| {
            let ptr = src.load(Ordering::Acquire, &session);
            black_box(ptr);
        });
    });

    group.finish();
    drop(session);
    let last = unsafe { src.load_unprotected(Ordering::Relaxed) };
    unsafe { drop(Box::from_raw(last.as_ptr())) };
}

fn bench_retire_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("retire_scan");

    for batch in [16usize, 64, 256].iter() {
        group.throughput(Throughput::Elements(*batch as u64));
        group.bench_with_input(BenchmarkId::from_parameter(batch), batch, |b, &size| {
            let registry = HazardRegistry::new(1);
            let session = registry.register().unwrap();
            b.iter(|| {
                for i in 0..size {
                    let node = Box::into_raw(Box::new(i as u64));
                    unsafe { session.retire(Shared::from_raw(node)) };
                }
                session.scan();
            });
        });
    }

    group.finish();
}

fn bench_swap_retire(c: &mut Criterion) {
    let mut group = c.benchmark_group("swap_retire");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_thread", |b| {
        let registry = HazardRegistry::new(1);
        let session = registry.register().unwrap();
        let src: Atomic<u64> = Atomic::null();
        b.iter(|| {
            let new = Box::into_raw(Box::new(1u64));
            let old = session.protect(&src, 0);
            if src
                .compare_exchange(
                    old,
                    unsafe { Shared::from_raw(new) },
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                    &session,
                )
                .is_ok()
            {
                session.clear();
                if !old.is_null() {
                    unsafe { session.retire(old) };
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_protect, bench_retire_scan, bench_swap_retire);
criterion_main!(benches);
