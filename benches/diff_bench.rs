#![allow(dead_code, clippy::useless_vec)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use tmplchain::core::diff::{apply, produce};

fn sample_text(lines: usize, churn_every: usize) -> (String, String) {
    let mut old = String::new();
    let mut new = String::new();
    for i in 0..lines {
        old.push_str(&format!("line {i} of the original body\n"));
        if churn_every != 0 && i % churn_every == 0 {
            new.push_str(&format!("line {i} of the original body, edited\n"));
        } else {
            new.push_str(&format!("line {i} of the original body\n"));
        }
    }
    (old, new)
}

fn bench_produce(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_produce");
    group.measurement_time(Duration::from_secs(10));

    for size in [100usize, 1_000, 5_000] {
        let (old, new) = sample_text(size, 17);
        group.bench_with_input(BenchmarkId::new("lines", size), &size, |b, _| {
            b.iter(|| black_box(produce(&old, &new, "old.txt", "new.txt", 3)));
        });
    }

    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_apply");
    group.measurement_time(Duration::from_secs(10));

    for size in [100usize, 1_000, 5_000] {
        let (old, new) = sample_text(size, 17);
        let diff = produce(&old, &new, "old.txt", "new.txt", 3);
        group.bench_with_input(BenchmarkId::new("lines", size), &size, |b, _| {
            b.iter(|| black_box(apply(&old, &diff, 3).unwrap()));
        });
    }

    group.finish();
}

fn bench_apply_with_drift(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_apply_fuzzy_drift");
    group.measurement_time(Duration::from_secs(10));

    let (old, new) = sample_text(1_000, 23);
    let diff = produce(&old, &new, "old.txt", "new.txt", 3);
    // Insert a few lines near the top so every hunk's declared line number
    // is off by a small, fixed amount, forcing the fuzzy-retry path.
    let drifted_old = format!("extra line a\nextra line b\n{old}");

    group.bench_function("drifted_context", |b| {
        b.iter(|| black_box(apply(&drifted_old, &diff, 3)));
    });

    group.finish();
}

criterion_group!(benches, bench_produce, bench_apply, bench_apply_with_drift);
criterion_main!(benches);
