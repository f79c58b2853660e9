//! Micro benchmarks for the pdump capture ring: producer push throughput
//! and consumer drain cost under steady churn.
//!
//! ```bash
//! cargo bench --bench bench_pdump
//! ```

use criterion::{criterion_group, criterion_main, Criterion};
use fwdp_lib::pdump::{new_ring, QueueKind, RingMsgHeader};

fn header(i: u32) -> RingMsgHeader {
    RingMsgHeader { total_len: 0, packet_len: 128, timestamp: i as u64, worker_idx: 0, pipeline_idx: 0, rx_device: 0, tx_device: 1, queue_kind: QueueKind::Output }
}

fn bench_push(c: &mut Criterion) {
    let (mut writer, _reader) = new_ring(1 << 20).unwrap();
    let payload = vec![0u8; 128];
    let mut i = 0u32;

    c.bench_function("pdump_ring_push_128b_payload", |b| {
        b.iter(|| {
            writer.push(header(i), std::hint::black_box(&payload));
            i = i.wrapping_add(1);
        });
    });
}

fn bench_drain(c: &mut Criterion) {
    let (mut writer, mut reader) = new_ring(1 << 20).unwrap();
    let payload = vec![0u8; 128];

    c.bench_function("pdump_ring_drain_after_burst", |b| {
        b.iter(|| {
            for i in 0..64u32 {
                writer.push(header(i), &payload);
            }
            let msgs = reader.drain();
            std::hint::black_box(msgs.len());
        });
    });
}

criterion_group!(pdump_benches, bench_push, bench_drain);
criterion_main!(pdump_benches);
