//! Filter engine benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use restmirror_bench::synced_items;
use restmirror_query::{trigram_similarity, Query, QueryParams};

/// Benchmark filter + ordering over growing collections.
fn bench_filter_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_order");
    let params = QueryParams::new()
        .with("filter:rank.gte", "250")
        .with("exclude:active", "false")
        .with("ordering", "-rank,name");
    let query = Query::parse(&params);

    for count in [100, 1_000, 10_000].iter() {
        let records = synced_items(*count);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &records, |b, records| {
            b.iter(|| black_box(query.evaluate(black_box(records))));
        });
    }

    group.finish();
}

/// Benchmark paginated runs, including cursor synthesis.
fn bench_paginated_run(c: &mut Criterion) {
    let records = synced_items(5_000);
    let params = QueryParams::new()
        .with("filter:owner.team.in", "team-1,team-3")
        .with("limit", "25")
        .with("offset", "100");
    let query = Query::parse(&params);

    c.bench_function("paginated_run_5000", |b| {
        b.iter(|| black_box(query.run(black_box(&records), "/items/", &params)));
    });
}

/// Benchmark fuzzy search scoring.
fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");

    group.bench_function("trigram_similarity", |b| {
        b.iter(|| black_box(trigram_similarity(black_box("huckleberry 42"), black_box("huckle"))));
    });

    let records = synced_items(1_000);
    let params = QueryParams::new().with("search_query:name", "banan");
    let query = Query::parse(&params);
    group.bench_function("search_query_1000", |b| {
        b.iter(|| black_box(query.evaluate(black_box(&records))));
    });

    group.finish();
}

criterion_group!(benches, bench_filter_order, bench_paginated_run, bench_search);
criterion_main!(benches);
