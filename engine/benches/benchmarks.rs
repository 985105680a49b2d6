//! Performance benchmarks for waypost-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use waypost_engine::{
    clean, diff_snapshots, listing_from_remote, plan_bootstrap, plan_snapshot, sanitize_for_remote,
    Contact, Listing, MediaResolver, NodeRole, RawDocument, RemoteSnapshot,
};

fn sample_listing(i: usize) -> Listing {
    Listing::new(format!("L{i}"), format!("Listing {i}"))
        .with_description("Two bedrooms, river view")
        .with_location(48.85 + i as f64 * 0.001, 2.35)
        .with_images(["/img/a.jpg", "/img/b.jpg", "https://cdn.example.com/c.jpg"])
        .with_contact(Contact {
            name: Some("Ana".into()),
            photo: Some("/img/ana.png".into()),
            ..Default::default()
        })
}

fn documents(range: std::ops::Range<usize>, tag: &str) -> Vec<RawDocument> {
    range
        .map(|i| {
            RawDocument::new(
                format!("L{i}"),
                json!({"title": format!("Listing {i} {tag}"), "images": ["/img/a.jpg", null]}),
            )
        })
        .collect()
}

fn bench_sanitize(c: &mut Criterion) {
    let mut group = c.benchmark_group("sanitize");

    group.bench_function("sanitize_for_remote", |b| {
        let listing = sample_listing(1);
        b.iter(|| sanitize_for_remote(black_box(&listing)))
    });

    group.bench_function("clean_nested", |b| {
        let mut nested = json!({"leaf": 1, "gone": null});
        for _ in 0..20 {
            nested = json!({"nested": nested, "list": [1, null, 2], "gone": null});
        }
        b.iter(|| clean(black_box(nested.clone())))
    });

    group.bench_function("listing_from_remote", |b| {
        let resolver = MediaResolver::new("https://listings.example.com").unwrap();
        let doc = RawDocument::new("L1", sanitize_for_remote(&sample_listing(1)).unwrap());
        b.iter(|| listing_from_remote(black_box(&doc), &resolver))
    });

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for size in [100, 1000, 5000].iter() {
        group.bench_with_input(BenchmarkId::new("diff_snapshots", size), size, |b, &size| {
            let previous = documents(0..size, "v1");
            let next = documents(size / 4..size + size / 4, "v2");
            b.iter(|| diff_snapshots(black_box(&previous), black_box(&next)))
        });
    }

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("plan_bootstrap", size), size, |b, &size| {
            let local: Vec<_> = (0..size).map(sample_listing).collect();
            let remote: Vec<_> = (size / 2..size * 2).map(sample_listing).collect();
            b.iter(|| plan_bootstrap(NodeRole::Primary, black_box(&local), black_box(&remote)))
        });

        group.bench_with_input(
            BenchmarkId::new("plan_snapshot_replica", size),
            size,
            |b, &size| {
                let snapshot = RemoteSnapshot::initial(documents(0..size, "v1"));
                let local: Vec<String> = (size / 2..size * 2).map(|i| format!("L{i}")).collect();
                b.iter(|| plan_snapshot(NodeRole::Replica, black_box(&local), &snapshot))
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_sanitize, bench_diff, bench_reconciliation);
criterion_main!(benches);
