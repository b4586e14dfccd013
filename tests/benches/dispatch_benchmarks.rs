//! # Dispatch Benchmarks
//!
//! | Path | What is measured |
//! |------|------------------|
//! | submit → tick | Fire-and-forget batch, routed to one subscriber |
//! | submit_awaiting | Batch of correlated requests resolved by ticking |
//! | fan-out | One response delivered to N subscribers |

use client_runtime::{register_catalog, Ping, Pong, ServerState};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shared_bus::MessageBus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn catalog_bus() -> MessageBus {
    register_catalog(MessageBus::builder(), &ServerState::new())
        .and_then(|builder| builder.start())
        .expect("catalog bus should start")
}

/// Tick until `expected` pongs have been counted.
fn drain(bus: &MessageBus, counter: &AtomicU64, expected: u64) {
    while counter.load(Ordering::Relaxed) < expected {
        bus.tick();
        std::hint::spin_loop();
    }
}

fn bench_submit_and_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit-route");
    group.measurement_time(Duration::from_secs(5));

    let bus = catalog_bus();
    let counter = Arc::new(AtomicU64::new(0));
    let sink = Arc::clone(&counter);
    bus.subscribe_fn(move |_: &Pong| {
        sink.fetch_add(1, Ordering::Relaxed);
    });

    for size in [1u64, 64, 1024] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("ping_batch", size), &size, |b, &size| {
            b.iter(|| {
                let start = counter.load(Ordering::Relaxed);
                for _ in 0..size {
                    bus.submit(Ping {
                        correlation_id: bus.next_correlation_id(),
                    });
                }
                drain(&bus, &counter, start + size);
            })
        });
    }

    group.finish();
}

fn bench_correlated_futures(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlated");
    group.measurement_time(Duration::from_secs(5));

    let bus = catalog_bus();

    for size in [1usize, 64, 512] {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("await_batch", size), &size, |b, &size| {
            b.iter(|| {
                let futures: Vec<_> = (0..size)
                    .map(|_| {
                        bus.submit_awaiting::<_, Pong>(Ping {
                            correlation_id: bus.next_correlation_id(),
                        })
                    })
                    .collect();
                while !futures.iter().all(|f| f.is_completed()) {
                    bus.tick();
                }
                black_box(futures)
            })
        });
    }

    group.finish();
}

fn bench_broadcast_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("fanout");

    for subscribers in [1usize, 8, 64] {
        let bus = catalog_bus();
        let counter = Arc::new(AtomicU64::new(0));
        for _ in 0..subscribers {
            let sink = Arc::clone(&counter);
            bus.subscribe_fn(move |_: &Pong| {
                sink.fetch_add(1, Ordering::Relaxed);
            });
        }

        group.throughput(Throughput::Elements(subscribers as u64));
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &subscribers| {
                b.iter(|| {
                    let start = counter.load(Ordering::Relaxed);
                    bus.submit(Ping {
                        correlation_id: bus.next_correlation_id(),
                    });
                    drain(&bus, &counter, start + subscribers as u64);
                })
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_and_route,
    bench_correlated_futures,
    bench_broadcast_fanout
);
criterion_main!(benches);
