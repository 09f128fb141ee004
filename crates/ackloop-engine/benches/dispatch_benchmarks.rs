//! Benchmarks for the hot paths that run on every send and every inbound
//! message: command encoding and subscription fan-out.
//!
//! Inbound fan-out happens on the receive path, so its cost per message
//! bounds how many notifications per second the registry can absorb.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use ackloop_core::types::{Command, InboundMessage};
use ackloop_engine::SubscriptionRegistry;

fn bench_command_encode(c: &mut Criterion) {
    let interact = Command::new(0x13).dword(1).dword(4242);
    let buy = Command::new(0x32)
        .dword(4242)
        .dword(91_000)
        .dword(0x8000_0000)
        .dword(0);
    let cast = Command::new(0x0c).word(5120).word(4860);

    let mut group = c.benchmark_group("command_encode");
    group.bench_function("interact", |b| b.iter(|| interact.encode()));
    group.bench_function("buy", |b| b.iter(|| buy.encode()));
    group.bench_function("cast_at_location", |b| b.iter(|| cast.encode()));
    group.finish();
}

/// Fan-out of one message across registries of increasing size, where only
/// every fourth subscription matches.
fn bench_registry_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build benchmark runtime");
    let _guard = runtime.enter();

    let mut group = c.benchmark_group("registry_dispatch");
    group.measurement_time(Duration::from_secs(5));

    for subscribers in [1usize, 16, 128] {
        let registry = SubscriptionRegistry::with_capacity(4096);
        for i in 0..subscribers {
            let opcode: u8 = if i % 4 == 0 { 0x9c } else { 0x15 };
            registry.subscribe(opcode, |msg: &InboundMessage| {
                std::hint::black_box(msg.payload.len());
            });
        }

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, _| {
                b.iter(|| registry.dispatch(InboundMessage::new(0x9c, vec![0u8; 16])));
            },
        );
        registry.shutdown();
    }

    group.finish();
}

criterion_group!(benches, bench_command_encode, bench_registry_dispatch);
criterion_main!(benches);
