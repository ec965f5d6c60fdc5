//! Criterion benchmarks for core selection.
//!
//! Uses a synthetic SSR collection to measure incremental versus
//! from-scratch scoring and the throughput of short search runs.

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use corehunter::{
    search, AccessionTable, PseudoMeasure, SearchConfig, SearchStrategy, TraitSource,
};

/// Random SSR collection: `n` accessions, 10 markers of 4 alleles each.
fn synthetic_table(n: usize, seed: u64) -> AccessionTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table = AccessionTable::new();
    for i in 0..n {
        let markers: Vec<Vec<Option<f64>>> = (0..10)
            .map(|_| {
                let mut freqs: Vec<f64> = (0..4).map(|_| rng.random::<f64>()).collect();
                let sum: f64 = freqs.iter().sum();
                freqs.iter_mut().for_each(|f| *f /= sum);
                freqs.into_iter().map(Some).collect()
            })
            .collect();
        table
            .add(format!("acc-{i}"), TraitSource::Ssr(markers))
            .unwrap();
    }
    table
}

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("scoring");
    for &n in &[50usize, 200] {
        let table = synthetic_table(n, 1);
        let pm = PseudoMeasure::from_names(&[("MR", 0.7), ("SH", 0.3)], n).unwrap();
        let core: Vec<usize> = (0..n / 2).collect();

        group.bench_with_input(BenchmarkId::new("fresh", n), &n, |b, _| {
            b.iter(|| black_box(pm.calculate(&core, &table, None)));
        });

        // incremental: score the core, then re-score after a single swap
        group.bench_with_input(BenchmarkId::new("incremental_swap", n), &n, |b, _| {
            let mut cache = pm.new_cache(&table);
            pm.calculate(&core, &table, Some(&mut cache));
            let mut swapped = core.clone();
            swapped[0] = n - 1;
            b.iter(|| black_box(pm.calculate(&swapped, &table, Some(&mut cache))));
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    group.sample_size(10);

    let table = Arc::new(synthetic_table(100, 2));
    let pm = Arc::new(PseudoMeasure::from_names(&[("MR", 1.0)], 100).unwrap());

    group.bench_function("forward_selection_to_20", |b| {
        let config = SearchConfig::new(20, 20).with_seed(3);
        b.iter(|| {
            black_box(search(&table, &pm, &SearchStrategy::forward(), &config, None).unwrap())
        });
    });

    group.bench_function("local_search_100ms", |b| {
        let config = SearchConfig::new(20, 20)
            .with_runtime(Duration::from_millis(100))
            .with_seed(4);
        b.iter(|| black_box(search(&table, &pm, &SearchStrategy::Local, &config, None).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_scoring, bench_search);
criterion_main!(benches);
