//! Micro benchmarks for the sharded TTL map (`fwmap`): single-shard
//! insert throughput and steady-state lookup latency.
//!
//! ```bash
//! cargo bench --bench bench_fwmap
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use fwdp_lib::fwstate::{Fw4Key, FwStateValue, Fwmap, HashKind};
use std::net::Ipv4Addr;

fn populated_map(entries: u32) -> Fwmap<Fw4Key, FwStateValue> {
    let map = Fwmap::new(1 << 16, 1, HashKind::Fnv1a, 0, 0).unwrap();
    for i in 0..entries {
        let key = Fw4Key::new(6, Ipv4Addr::from(i), 4000, Ipv4Addr::from(i.wrapping_add(1)), 80);
        map.put(0, 0, 1_000_000_000, key, FwStateValue::new_forward(6, 0, 0)).unwrap();
    }
    map
}

fn bench_put_new_entry(c: &mut Criterion) {
    let map = populated_map(10_000);
    let mut counter = 10_000u32;

    c.bench_function("fwmap_put_new_entry", |b| {
        b.iter(|| {
            let i = std::hint::black_box(counter);
            let key = Fw4Key::new(6, Ipv4Addr::from(i), 4000, Ipv4Addr::from(i.wrapping_add(1)), 80);
            map.put(0, 0, 1_000_000_000, key, FwStateValue::new_forward(6, 0, 0)).unwrap();
            counter = counter.wrapping_add(1);
        });
    });
}

fn bench_get_hit(c: &mut Criterion) {
    let map = populated_map(10_000);
    let key = Fw4Key::new(6, Ipv4Addr::from(5_000u32), 4000, Ipv4Addr::from(5_001u32), 80);
    assert!(map.get(0, &key).is_some(), "fixture key must be present");

    c.bench_function("fwmap_get_hit", |b| {
        b.iter(|| map.get(std::hint::black_box(0), std::hint::black_box(&key)));
    });
}

criterion_group!(fwmap_benches, bench_put_new_entry, bench_get_hit);
criterion_main!(fwmap_benches);
