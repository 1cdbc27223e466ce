//! Propagation benchmarks
//!
//! Run with: cargo bench

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::{Computed, Runtime};

fn bench_signal_get(c: &mut Criterion) {
    let rt = Runtime::new();
    let s = rt.signal(42_i32);
    c.bench_function("signal_get", |b| b.iter(|| black_box(s.get())));
}

fn bench_signal_set_same_value(c: &mut Criterion) {
    let rt = Runtime::new();
    let s = rt.signal(42_i32);
    c.bench_function("signal_set_same_value", |b| b.iter(|| s.set(black_box(42))));
}

fn bench_cached_computed_get(c: &mut Criterion) {
    let rt = Runtime::new();
    let s = rt.signal(1_i32);
    let doubled = {
        let s = s.clone();
        rt.computed(move || s.get() * 2)
    };
    doubled.get();
    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(doubled.get())));
}

fn bench_diamond(c: &mut Criterion) {
    let rt = Runtime::new();
    let a = rt.signal(0_i64);
    let b = {
        let a = a.clone();
        rt.computed(move || a.get() + 1)
    };
    let c_cell = {
        let a = a.clone();
        rt.computed(move || a.get() * 2)
    };
    let runs = Arc::new(AtomicU64::new(0));
    let _effect = {
        let (b, c_cell, runs) = (b.clone(), c_cell.clone(), runs.clone());
        rt.effect(move |_| {
            black_box(b.get() + c_cell.get());
            runs.fetch_add(1, Ordering::Relaxed);
        })
    };

    let mut next = 0;
    c.bench_function("diamond_write", |bench| {
        bench.iter(|| {
            next += 1;
            a.set(next)
        })
    });
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_write");
    for width in [10_usize, 100, 1000] {
        let rt = Runtime::new();
        let source = rt.signal(0_u64);
        let cells: Vec<Computed<u64>> = (0..width)
            .map(|i| {
                let source = source.clone();
                rt.computed(move || source.get() + i as u64)
            })
            .collect();
        let _effect = rt.effect(move |_| {
            black_box(cells.iter().map(Computed::get).sum::<u64>());
        });

        let mut next = 0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |bench, _| {
            bench.iter(|| {
                next += 1;
                source.set(next)
            })
        });
    }
    group.finish();
}

fn bench_chain(c: &mut Criterion) {
    let rt = Runtime::new();
    let head = rt.signal(0_u64);
    let mut tail: Computed<u64> = {
        let head = head.clone();
        rt.computed(move || head.get())
    };
    for _ in 0..100 {
        let prev = tail.clone();
        tail = rt.computed(move || prev.get() + 1);
    }

    let mut next = 0;
    c.bench_function("chain_100_write_then_read", |bench| {
        bench.iter(|| {
            next += 1;
            head.set(next);
            black_box(tail.get())
        })
    });
}

criterion_group!(
    benches,
    bench_signal_get,
    bench_signal_set_same_value,
    bench_cached_computed_get,
    bench_diamond,
    bench_fan_out,
    bench_chain,
);
criterion_main!(benches);
