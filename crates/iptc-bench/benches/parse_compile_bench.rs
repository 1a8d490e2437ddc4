//! Parse (§4.4) and compile+commit (§4.6/§4.7) round-trip benchmarks
//! over synthetic tables with many user-defined chains and rules.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iptc_core::blob::{self, RawInfo};
use iptc_core::table::Table;
use iptc_harness::fixture::MockTransport;

fn standard_entry(verdict: i32) -> Vec<u8> {
    blob::build_entry(&[0u8; blob::IP_TUPLE_SIZE], &[], blob::STANDARD_TARGET_NAME, 0, &verdict.to_le_bytes())
}

fn fallthrough_entry() -> Vec<u8> {
    blob::build_entry(&[0u8; blob::IP_TUPLE_SIZE], &[], "", 0, &[])
}

fn error_chain_header(name: &str) -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::ERROR_TARGET_NAME,
        0,
        &blob::error_payload(name),
    )
}

fn error_footer() -> Vec<u8> {
    blob::build_entry(
        &[0u8; blob::IP_TUPLE_SIZE],
        &[],
        blob::ERROR_TARGET_NAME,
        0,
        &blob::error_payload("ERROR"),
    )
}

/// A synthetic snapshot: the three stock built-in chains (empty) plus
/// `n_chains` user-defined chains, each holding `rules_per_chain`
/// FALL-THROUGH rules ahead of its RETURN footer.
fn build_layered_table(n_chains: usize, rules_per_chain: usize) -> (String, RawInfo, Vec<u8>) {
    let mut blob = Vec::new();
    blob.extend_from_slice(&standard_entry(-1)); // INPUT
    blob.extend_from_slice(&standard_entry(-2)); // FORWARD
    blob.extend_from_slice(&standard_entry(-1)); // OUTPUT

    let mut num_entries = 3u32;
    for i in 0..n_chains {
        blob.extend_from_slice(&error_chain_header(&format!("c{i:05}")));
        num_entries += 1;
        for _ in 0..rules_per_chain {
            blob.extend_from_slice(&fallthrough_entry());
            num_entries += 1;
        }
        blob.extend_from_slice(&standard_entry(-5)); // RETURN
        num_entries += 1;
    }
    blob.extend_from_slice(&error_footer());
    num_entries += 1;

    let off_input = 0u32;
    let off_forward = blob::next_offset(&blob, off_input).unwrap();
    let off_output = blob::next_offset(&blob, off_forward).unwrap();

    let mut hook_entry = vec![0u32; 5];
    let mut underflow = vec![0u32; 5];
    hook_entry[1] = off_input;
    hook_entry[2] = off_forward;
    hook_entry[3] = off_output;
    underflow[1] = off_input;
    underflow[2] = off_forward;
    underflow[3] = off_output;

    let info = RawInfo {
        valid_hooks: (1 << 1) | (1 << 2) | (1 << 3),
        hook_entry,
        underflow,
        num_entries,
        size: blob.len() as u32,
    };
    ("filter".to_string(), info, blob)
}

fn bench_parse(c: &mut Criterion) {
    let shapes: &[(usize, usize)] = &[(10, 5), (100, 10), (400, 10)];
    let mut group = c.benchmark_group("parse_blob");

    for &(n_chains, rules) in shapes {
        let (name, info, blob) = build_layered_table(n_chains, rules);
        let label = format!("{n_chains}x{rules}");
        group.bench_with_input(BenchmarkId::new("init", &label), &label, |b, _| {
            b.iter(|| {
                let transport = MockTransport::new(info.clone(), blob.clone());
                let t = Table::init(&name, transport).expect("fixture blob must parse");
                black_box(t);
            });
        });
    }
    group.finish();
}

fn bench_compile_and_commit(c: &mut Criterion) {
    let shapes: &[(usize, usize)] = &[(10, 5), (100, 10), (400, 10)];
    let mut group = c.benchmark_group("compile_and_commit");

    for &(n_chains, rules) in shapes {
        let (name, info, blob) = build_layered_table(n_chains, rules);
        let label = format!("{n_chains}x{rules}");
        group.bench_with_input(BenchmarkId::new("commit", &label), &label, |b, _| {
            b.iter(|| {
                let transport = MockTransport::new(info.clone(), blob.clone());
                let mut t = Table::init(&name, transport).expect("fixture blob must parse");
                // Touch an already-empty built-in chain to set `changed`
                // without altering the compiled shape under measurement.
                t.zero_entries("INPUT").expect("INPUT is a valid chain");
                t.commit().expect("commit against the mock transport always succeeds");
                black_box(&t);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_parse, bench_compile_and_commit);
criterion_main!(benches);
