// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Segment lock and notification benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shmlink_benchmark::{bench_config, create_segment};
use shmlink_core::SharedMemory;
use std::thread;
use std::time::Duration;

/// Payload sizes for copy benchmarks.
const PAYLOAD_SIZES: &[u32] = &[64, 1024, 4096, 65536];

// Turn flag values kept in the first payload byte.
const IDLE: u8 = 0;
const REQUEST: u8 = 1;
const STOP: u8 = 2;

/// Benchmark an uncontended lock/unlock pair.
fn bench_lock_unlock(c: &mut Criterion) {
    let segment = create_segment("lock", 64);

    c.bench_function("lock_unlock", |b| {
        b.iter(|| {
            black_box(segment.lock());
            segment.unlock();
        });
    });
}

/// Benchmark copying a payload into the segment under the lock.
fn bench_guarded_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_write");

    for &size in PAYLOAD_SIZES {
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let segment = create_segment(&format!("write-{}", size), size);
            let payload = vec![0xABu8; size as usize];

            b.iter(|| {
                let mut guard = segment.guard().expect("Failed to lock segment");
                guard.as_mut_slice().copy_from_slice(black_box(&payload));
            });
        });
    }

    group.finish();
}

/// Benchmark a request/response round trip between two attachments of the
/// same segment.
fn bench_notify_ping_pong(c: &mut Criterion) {
    let mut group = c.benchmark_group("notify");
    group.measurement_time(Duration::from_secs(5));

    let requester = create_segment("ping-pong", 8);
    let name = requester.name().to_string();

    let responder = thread::spawn(move || {
        let segment = SharedMemory::open_with(&name, 0, &bench_config());
        let mut guard = segment.guard().expect("Failed to lock segment");
        loop {
            while guard.as_slice()[0] == IDLE {
                guard.wait();
            }
            if guard.as_slice()[0] == STOP {
                break;
            }
            guard.as_mut_slice()[0] = IDLE;
            segment.notify_all();
        }
    });

    group.bench_function("ping_pong", |b| {
        b.iter(|| {
            let mut guard = requester.guard().expect("Failed to lock segment");
            guard.as_mut_slice()[0] = REQUEST;
            requester.notify_all();
            while guard.as_slice()[0] != IDLE {
                guard.wait();
            }
        });
    });

    group.finish();

    {
        let mut guard = requester.guard().expect("Failed to lock segment");
        guard.as_mut_slice()[0] = STOP;
    }
    requester.notify_all();
    responder.join().expect("Responder panicked");
}

criterion_group!(
    benches,
    bench_lock_unlock,
    bench_guarded_write,
    bench_notify_ping_pong
);
criterion_main!(benches);
