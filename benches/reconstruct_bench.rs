#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::BTreeMap;
use std::time::Duration;
use tempfile::TempDir;
use tmplchain::core::chain::Chain;
use tmplchain::core::record::{write_migration, MigrationDraft, Operation};
use tmplchain::core::state::reconstruct;

/// Builds a chain of `count` migrations. Each even-indexed migration adds a
/// new file; each odd-indexed migration modifies the file added just before
/// it, so `reconstruct` exercises both `New` and `Modify` folding at scale.
fn build_chain(count: usize) -> TempDir {
    let dir = TempDir::new().unwrap();
    let migrations_dir = dir.path().join("migrations");

    for i in 0..count {
        let id = format!("2026{:02}{:02}T000000Z", 1 + (i / 28) % 12, 1 + i % 28);
        let mut files = BTreeMap::new();
        let ops = if i % 2 == 0 {
            let path = format!("file_{i}.txt");
            files.insert(format!("{path}.template"), format!("content {i}\n").into_bytes());
            vec![Operation::New { path, feature: None }]
        } else {
            let path = format!("file_{}.txt", i - 1);
            let old = format!("content {}\n", i - 1);
            let new = format!("content {}, revised\n", i - 1);
            let diff = tmplchain::core::diff::produce(&old, &new, &path, &path, 3);
            files.insert(format!("{path}.diff"), diff.into_bytes());
            vec![Operation::Modify { path, feature: None }]
        };
        write_migration(&migrations_dir, &id, &MigrationDraft { label: None, ops, files }).unwrap();
    }

    dir
}

fn bench_reconstruct_full_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct_full_chain");
    group.measurement_time(Duration::from_secs(10));

    for size in [10usize, 50, 200] {
        let dir = build_chain(size);
        let chain = Chain::load(dir.path()).unwrap();
        group.bench_with_input(BenchmarkId::new("migrations", size), &size, |b, _| {
            b.iter(|| black_box(reconstruct(&chain, None).unwrap()));
        });
    }

    group.finish();
}

fn bench_reconstruct_up_to_midpoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconstruct_up_to_midpoint");
    group.measurement_time(Duration::from_secs(10));

    let dir = build_chain(200);
    let chain = Chain::load(dir.path()).unwrap();
    let midpoint = chain.ids()[100].clone();

    group.bench_function("200_migrations_stop_at_100", |b| {
        b.iter(|| black_box(reconstruct(&chain, Some(&midpoint)).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_reconstruct_full_chain, bench_reconstruct_up_to_midpoint);
criterion_main!(benches);
