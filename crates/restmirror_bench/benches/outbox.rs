//! Mirror and outbox benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use restmirror_bench::{item, item_store};
use restmirror_store::{Method, StoreRegistry};
use restmirror_sync::{LocalMirror, MockRemote, OutboxSynchronizer, RetentionPolicy};
use serde_json::json;
use std::sync::Arc;

/// Benchmark local writes against a populated store.
fn bench_local_update(c: &mut Criterion) {
    let mirror = LocalMirror::new(Arc::new(item_store(1_000)));
    let mut i = 0usize;

    c.bench_function("local_update", |b| {
        b.iter(|| {
            i = (i + 1) % 1_000;
            let url = format!("/items/{}/", i);
            black_box(mirror.update("t", &url, item(i)).unwrap());
        });
    });
}

/// Benchmark gathering and ordering the outbox.
fn bench_outbox_scan(c: &mut Criterion) {
    let registry = StoreRegistry::new();
    let remote = Arc::new(MockRemote::new());
    let outbox = OutboxSynchronizer::new(remote);
    for name in ["items", "users", "orders"] {
        let mirror = LocalMirror::open(&registry, name);
        for i in 0..300 {
            mirror
                .update("t", &format!("/{}/{}/", name, i), json!({"id": i}))
                .unwrap();
        }
        outbox.register(mirror.registration(RetentionPolicy::default()));
    }

    c.bench_function("outbox_scan_900", |b| {
        b.iter(|| black_box(outbox.outbox().unwrap()));
    });
}

/// Benchmark a full drain against the mock remote.
fn bench_sync_drain(c: &mut Criterion) {
    c.bench_function("sync_drain_100", |b| {
        b.iter_batched(
            || {
                let registry = StoreRegistry::new();
                let mirror = LocalMirror::open(&registry, "items");
                for i in 0..100 {
                    mirror.create("t", &format!("/items/{}/", i), item(i)).unwrap();
                }
                let remote = Arc::new(MockRemote::new());
                remote.respond(Method::Post, "/items/", json!({"ok": true}));
                let outbox = OutboxSynchronizer::new(remote);
                outbox.register(mirror.registration(RetentionPolicy::default()));
                (registry, outbox)
            },
            |(_registry, outbox)| black_box(outbox.sync().unwrap()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_local_update, bench_outbox_scan, bench_sync_drain);
criterion_main!(benches);
