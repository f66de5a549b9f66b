//! Reconciliation benchmarks for CrabDock
//!
//! Run with: cargo bench --bench reconcile_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use crabdock::testing::{MemoryDock, MemoryMappingStore, MemoryPresence};
use crabdock::{DockEmbedConfig, EmbedAvClient, EmbedUrlBuilder, MemoryDocument, ParticipantId};
use std::sync::Arc;
use std::time::Duration;

/// A connected client over a dock with `count` mapped, active participants
fn populated_client(count: usize) -> EmbedAvClient {
    let config = DockEmbedConfig::default();
    let document = Arc::new(MemoryDocument::new());
    let dock = Arc::new(MemoryDock::new(document.clone(), config.dock.clone()));
    let ids: Vec<String> = (0..count).map(|i| format!("user-{}", i)).collect();

    for id in &ids {
        let _ = dock.add_tile(id.as_str());
    }
    let store = Arc::new(MemoryMappingStore::with_entries(
        ids.iter()
            .map(|id| (id.as_str(), format!("https://vdo.example/?view={}", id))),
    ));
    let presence = Arc::new(MemoryPresence::with_active(ids.iter().map(String::as_str)));

    let client = EmbedAvClient::new(config, document, dock, store, presence);
    client.connect();
    client
}

fn bench_reconcile_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reconcile Pass");
    group.measurement_time(Duration::from_secs(5));

    for count in [4usize, 16, 64] {
        let client = populated_client(count);
        client.reconciler().reconcile_now();

        group.bench_with_input(BenchmarkId::new("converged", count), &client, |b, client| {
            b.iter(|| black_box(client.reconciler().reconcile_now()));
        });

        group.bench_with_input(BenchmarkId::new("attach_detach", count), &client, |b, client| {
            b.iter(|| {
                client.disconnect();
                client.connect();
                black_box(client.reconciler().reconcile_now())
            });
        });
    }

    group.finish();
}

fn bench_embed_url(c: &mut Criterion) {
    let mut group = c.benchmark_group("Embed URL");
    let builder = EmbedUrlBuilder::new(&DockEmbedConfig::default().embed);
    let id = ParticipantId::new("stage left");

    group.bench_function("bare", |b| {
        b.iter(|| black_box(builder.build(black_box("https://vdo.example/?view=abc"), &id)))
    });

    let built = builder.build("https://vdo.example/?view=abc", &id);
    group.bench_function("already_normalized", |b| {
        b.iter(|| black_box(builder.build(black_box(&built), &id)))
    });

    group.bench_function("passthrough", |b| {
        b.iter(|| black_box(builder.build(black_box("not a url"), &id)))
    });

    group.finish();
}

criterion_group!(benches, bench_reconcile_pass, bench_embed_url);
criterion_main!(benches);
