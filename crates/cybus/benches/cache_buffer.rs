// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache buffer hot-path benchmarks: insert, latest fetch, ordered scan.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cybus::CacheBuffer;

fn bench_insert(c: &mut Criterion) {
    let buffer = CacheBuffer::new(256).expect("capacity > 0");
    c.bench_function("cache_buffer_insert", |b| {
        b.iter(|| {
            black_box(buffer.insert(black_box(42u64)));
        });
    });
}

fn bench_fetch_latest(c: &mut Criterion) {
    let buffer = CacheBuffer::new(256).expect("capacity > 0");
    for i in 0..256u64 {
        buffer.insert(i);
    }
    c.bench_function("cache_buffer_fetch_latest", |b| {
        b.iter(|| {
            black_box(buffer.fetch_latest());
        });
    });
}

fn bench_fetch_at_or_after(c: &mut Criterion) {
    let buffer = CacheBuffer::new(256).expect("capacity > 0");
    for i in 0..1024u64 {
        buffer.insert(i);
    }
    c.bench_function("cache_buffer_fetch_at_or_after", |b| {
        b.iter(|| {
            let mut seq = 1u64;
            black_box(buffer.fetch_at_or_after(black_box(&mut seq)));
        });
    });
}

fn bench_shared_insert_contended(c: &mut Criterion) {
    let buffer = Arc::new(CacheBuffer::new(256).expect("capacity > 0"));
    let reader = Arc::clone(&buffer);
    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let stop_reader = Arc::clone(&stop);
    let handle = std::thread::spawn(move || {
        while !stop_reader.load(std::sync::atomic::Ordering::Relaxed) {
            black_box(reader.fetch_latest());
        }
    });

    c.bench_function("cache_buffer_insert_with_reader", |b| {
        b.iter(|| {
            black_box(buffer.insert(black_box(7u64)));
        });
    });

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = handle.join();
}

criterion_group!(
    benches,
    bench_insert,
    bench_fetch_latest,
    bench_fetch_at_or_after,
    bench_shared_insert_contended
);
criterion_main!(benches);
