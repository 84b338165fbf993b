// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]
//! Benchmark: time-wheel insert and drain
//!
//! Schedules `n` events spread over a horizon four times the dense window, so
//! roughly three quarters land in the overflow list, then drains the wheel.
//! Setup builds the event times deterministically from a blake3 stream so
//! runs are comparable.
//!
//! Throughput "elements" are events (`n`).
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::time::Duration;
use switchyard_sched::{Scheduler, TimeWheel, WheelConfig};

const WINDOW: usize = 64;
const SEED: &[u8] = b"switchyard/wheel-drain";

fn times(n: usize) -> Vec<u64> {
    let mut reader = blake3::Hasher::new().update(SEED).finalize_xof();
    let horizon = (WINDOW * 4) as u64;
    (0..n)
        .map(|_| {
            let mut word = [0u8; 8];
            reader.fill(&mut word);
            u64::from_le_bytes(word) % horizon
        })
        .collect()
}

fn filled(times: &[u64]) -> TimeWheel<u64> {
    let mut wheel = TimeWheel::new(WINDOW);
    for &t in times {
        wheel.schedule(t, t).unwrap();
    }
    wheel
}

fn bench_wheel(c: &mut Criterion) {
    let mut group = c.benchmark_group("wheel_drain");
    group
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(5))
        .sample_size(50);
    for &n in &[100usize, 1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(n as u64));
        let ts = times(n);

        group.bench_with_input(BenchmarkId::new("schedule", n), &ts, |b, ts| {
            b.iter_batched(|| ts.clone(), |ts| black_box(filled(&ts)), BatchSize::LargeInput);
        });

        group.bench_with_input(BenchmarkId::new("drain", n), &ts, |b, ts| {
            b.iter_batched(
                || filled(ts),
                |mut wheel| {
                    let mut batch = Vec::with_capacity(64);
                    let mut sum = 0u64;
                    while let Some(mut front) = wheel.front() {
                        front.drain_into(&mut batch);
                        sum = batch.drain(..).fold(sum, u64::wrapping_add);
                        wheel.pop_front().unwrap();
                    }
                    black_box(sum)
                },
                BatchSize::LargeInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("scheduler_run", n), &ts, |b, ts| {
            b.iter_batched(
                || {
                    let sched = Scheduler::with_config(WheelConfig {
                        dense_window: WINDOW,
                        ..WheelConfig::default()
                    });
                    for &t in ts {
                        sched.schedule_at(t, move || { black_box(t); }).unwrap();
                    }
                    sched
                },
                |sched| black_box(sched.run().unwrap()),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_wheel);
criterion_main!(benches);
