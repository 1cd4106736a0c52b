// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use futures::executor::block_on;
use futures::stream::{FuturesUnordered, StreamExt};
use oneflight::Flight;

fn bench_uncontended(c: &mut Criterion) {
    let flight: Flight<u64, u64> = Flight::new();
    let mut key = 0_u64;

    c.bench_function("work_uncontended", |b| {
        b.iter(|| {
            key = key.wrapping_add(1);
            let outcome = block_on(flight.work(key, move || async move { key * 2 }));
            black_box(outcome.value)
        });
    });
}

fn bench_fan_in(c: &mut Criterion) {
    let mut group = c.benchmark_group("work_fan_in");

    for waiters in [4_usize, 32, 128] {
        group.bench_function(format!("{waiters}_callers"), |b| {
            let flight: Flight<&str, u64> = Flight::new();
            b.iter(|| {
                block_on(async {
                    let calls: FuturesUnordered<_> =
                        (0..waiters).map(|_| flight.work("key", || async { 7 })).collect();
                    let outcomes: Vec<_> = calls.collect().await;
                    black_box(outcomes.len())
                })
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_fan_in);
criterion_main!(benches);
