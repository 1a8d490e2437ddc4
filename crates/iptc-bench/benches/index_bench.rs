//! Chain Index benchmarks: build and name-lookup cost over a sparse
//! sorted array of user-defined chains (§4.2 of the original spec).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iptc_core::config::IndexConfig;
use iptc_core::index::ChainIndex;
use iptc_core::model::ChainId;

fn chain_ids(n: usize) -> Vec<ChainId> {
    (0..n).map(ChainId).collect()
}

fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{i:06}")).collect()
}

fn bench_build(c: &mut Criterion) {
    let sizes: &[usize] = &[40, 400, 4_000, 40_000];
    let mut group = c.benchmark_group("chain_index_build");

    for &n in sizes {
        let chains = chain_ids(n);
        let cfg = IndexConfig::default();
        group.bench_with_input(BenchmarkId::new("build", n), &n, |b, _| {
            b.iter(|| {
                let mut idx = ChainIndex::empty();
                idx.build(black_box(&chains), &cfg);
                black_box(&idx);
            });
        });
    }
    group.finish();
}

fn bench_lookup_by_name(c: &mut Criterion) {
    let sizes: &[usize] = &[40, 400, 4_000, 40_000];
    let mut group = c.benchmark_group("chain_index_lookup_by_name");

    for &n in sizes {
        let chains = chain_ids(n);
        let names = names(n);
        let cfg = IndexConfig::default();
        let mut idx = ChainIndex::empty();
        idx.build(&chains, &cfg);
        let name_of = |cid: ChainId| names[cid.0].clone();

        group.bench_with_input(BenchmarkId::new("lookup", n), &n, |b, &n| {
            let target = &names[n / 2];
            b.iter(|| {
                black_box(idx.lookup_by_name(black_box(target), name_of));
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup_by_name);
criterion_main!(benches);
