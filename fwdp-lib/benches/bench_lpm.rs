//! Micro benchmark for longest-prefix-match lookup. Pure CPU - builds a
//! realistic-size routing table once, then benchmarks lookups against it.
//!
//! ```bash
//! cargo bench --bench bench_lpm
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use fwdp_lib::lpm::Lpm;

fn build_table() -> Lpm {
    let mut lpm = Lpm::new(4);
    lpm.insert(&[0, 0, 0, 0], 0, 0);
    for a in 0u8..=255 {
        lpm.insert(&[10, a, 0, 0], 16, 1000 + a as u32);
        for b in 0u8..8 {
            lpm.insert(&[10, a, b, 0], 24, 2_000_000 + (a as u32) * 8 + b as u32);
        }
    }
    lpm
}

fn bench_lookup_hit(c: &mut Criterion) {
    let lpm = build_table();
    let addr = [10, 5, 3, 200];
    assert_ne!(lpm.lookup(&addr), fwdp_lib::lpm::LPM_VALUE_INVALID, "fixture address must resolve");

    c.bench_function("lpm_lookup_most_specific_hit", |b| {
        b.iter(|| lpm.lookup(std::hint::black_box(&addr)));
    });
}

fn bench_lookup_default_route(c: &mut Criterion) {
    let lpm = build_table();
    let addr = [203, 0, 113, 7];

    c.bench_function("lpm_lookup_falls_back_to_default", |b| {
        b.iter(|| lpm.lookup(std::hint::black_box(&addr)));
    });
}

criterion_group!(lpm_benches, bench_lookup_hit, bench_lookup_default_route);
criterion_main!(lpm_benches);
