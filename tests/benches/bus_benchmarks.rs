//! # Plugin-Core Benchmarks
//!
//! | Component | Operation | Expectation |
//! |-----------|-----------|-------------|
//! | EventRouter | fan-out to N handlers | linear in N |
//! | EventBus | full publish pipeline | dominated by validation + dedup |
//! | EventCompressor | zstd + base64 envelope | scales with payload |
//! | PluginDependencyGraph | cycle check + ordering | O(V + E) |
//! | ConfigManager | validated, sealed write | one AEAD seal per sensitive field |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use plugin_bus::{
    handler_fn, BusConfig, CompressionConfig, EventBus, EventCompressor, EventIdentityManager,
    EventPublisher, EventRouter, RouterConfig,
};
use plugin_config::{ConfigManager, ConfigManagerConfig, FieldEncryptor};
use plugin_crypto::{Cipher, SecretKey};
use plugin_registry::PluginDependencyGraph;
use plugin_tests::fixtures::{config, event, large_event, service_schema};
use rand::Rng;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// ============================================================================
// ROUTER
// ============================================================================

fn bench_router_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-router");

    for handlers in [1usize, 10, 50] {
        let router = EventRouter::new(RouterConfig::default());
        router.start().unwrap();
        router.register_channel("bench").unwrap();
        let delivered = Arc::new(AtomicU64::new(0));
        for _ in 0..handlers {
            let delivered = delivered.clone();
            router
                .subscribe(
                    "bench",
                    handler_fn(move |_| {
                        delivered.fetch_add(1, Ordering::Relaxed);
                        async { Ok(()) }
                    }),
                )
                .unwrap();
        }
        let event = Arc::new(event("bench", "BENCH.EVENT"));
        let router = &router;
        let event = &event;

        group.throughput(Throughput::Elements(handlers as u64));
        group.bench_with_input(BenchmarkId::new("route", handlers), &handlers, |b, _| {
            b.to_async(&rt).iter(|| async move {
                black_box(router.route("bench", event.clone()).await.unwrap())
            })
        });
    }

    group.finish();
}

// ============================================================================
// BUS PIPELINE
// ============================================================================

fn bench_bus_publish(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("event-bus");

    let bus = rt.block_on(async {
        let bus = EventBus::new(BusConfig::default());
        bus.start().unwrap();
        bus.register_channel("bench").unwrap();
        bus.subscribe("bench", handler_fn(|_| async { Ok(()) }))
            .unwrap();
        bus
    });
    let bus = &bus;

    group.bench_function("publish_small", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(bus.publish(event("bench", "BENCH.EVENT")).await.unwrap())
        })
    });

    group.bench_function("publish_4kb_compressed", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(bus.publish(large_event("bench", 4096)).await.unwrap())
        })
    });

    group.finish();
}

fn bench_identity(c: &mut Criterion) {
    let identity = EventIdentityManager::new();
    let ids: Vec<String> = (0..10_000).map(|_| identity.generate_id()).collect();

    c.bench_function("identity/check_and_mark_10k", |b| {
        b.iter(|| {
            for id in &ids {
                black_box(identity.check_and_mark(id));
            }
        })
    });
}

// ============================================================================
// COMPRESSION
// ============================================================================

fn bench_compression(c: &mut Criterion) {
    let compressor = EventCompressor::new(CompressionConfig::default());
    let mut group = c.benchmark_group("event-compressor");

    for size in [4 * 1024usize, 64 * 1024] {
        let mut rng = rand::thread_rng();
        let words: Vec<String> = (0..size / 8)
            .map(|_| format!("w{}", rng.gen_range(0..500)))
            .collect();
        let payload = json!({ "text": words.join(" ") });
        let envelope = compressor.compress(&payload);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("compress", size), &payload, |b, p| {
            b.iter(|| black_box(compressor.compress(p)))
        });
        group.bench_with_input(BenchmarkId::new("decompress", size), &envelope, |b, e| {
            b.iter(|| black_box(compressor.decompress(e).unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// DEPENDENCY GRAPH
// ============================================================================

fn random_dag(nodes: usize, edges_per_node: usize) -> PluginDependencyGraph {
    let mut rng = rand::thread_rng();
    let mut graph = PluginDependencyGraph::new();
    for i in 0..nodes {
        let name = format!("p{}", i);
        graph.add_plugin(&name);
        for _ in 0..edges_per_node.min(i) {
            let dep = rng.gen_range(0..i);
            graph.add_dependency(&name, &format!("p{}", dep));
        }
    }
    graph
}

fn bench_dependency_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependency-graph");

    for nodes in [100usize, 1000] {
        let graph = random_dag(nodes, 3);
        group.bench_with_input(BenchmarkId::new("validate", nodes), &graph, |b, g| {
            b.iter(|| black_box(g.validate_dependencies()))
        });
        group.bench_with_input(BenchmarkId::new("activation_order", nodes), &graph, |b, g| {
            b.iter(|| black_box(g.activation_order().unwrap()))
        });
    }

    group.finish();
}

// ============================================================================
// CONFIG
// ============================================================================

fn bench_config_write(c: &mut Criterion) {
    let rt = runtime();
    let manager = ConfigManager::new(ConfigManagerConfig::default()).with_encryption(
        FieldEncryptor::new(Cipher::XChaCha20Poly1305, SecretKey::generate()),
    );
    manager.register_schema("db", service_schema());
    let manager = &manager;

    c.bench_function("config/set_config_sealed", |b| {
        b.to_async(&rt).iter(|| async move {
            let result = manager
                .set_config(
                    "db",
                    config(json!({"endpoint": "postgres://db", "password": "hunter2"})),
                )
                .await;
            black_box(result.is_valid)
        })
    });
}

criterion_group!(
    benches,
    bench_router_fanout,
    bench_bus_publish,
    bench_identity,
    bench_compression,
    bench_dependency_graph,
    bench_config_write,
);
criterion_main!(benches);
