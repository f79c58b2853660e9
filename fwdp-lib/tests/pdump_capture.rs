//! Captures a batch of dropped packets into a pdump ring the way a
//! worker's drop path would (spec.md §4.9), then drains it from a
//! separate reader handle.

use fwdp_lib::pdump::{new_ring, QueueKind, RingMsgHeader};

#[test]
fn dropped_packets_are_captured_and_drained_in_order() {
    let (mut ring, mut reader) = new_ring(4096).unwrap();

    for i in 0..20u32 {
        let header = RingMsgHeader {
            total_len: 0,
            packet_len: 64,
            timestamp: 1_000 + i as u64,
            worker_idx: 0,
            pipeline_idx: 0,
            rx_device: 0,
            tx_device: 0,
            queue_kind: QueueKind::Drop,
        };
        ring.push(header, &vec![i as u8; 64]);
    }

    let messages = reader.drain();
    assert_eq!(messages.len(), 20);
    for (i, message) in messages.iter().enumerate() {
        assert_eq!(message.header.queue_kind, QueueKind::Drop);
        assert_eq!(message.header.timestamp, 1_000 + i as u64);
        assert_eq!(message.payload, vec![i as u8; 64]);
    }

    assert!(reader.drain().is_empty(), "nothing new since last drain");
}

#[test]
fn ring_overwrite_never_yields_garbage_to_the_reader() {
    let (mut ring, mut reader) = new_ring(256).unwrap();
    for i in 0..100u32 {
        let header = RingMsgHeader { total_len: 0, packet_len: i, timestamp: i as u64, worker_idx: 0, pipeline_idx: 0, rx_device: 0, tx_device: 0, queue_kind: QueueKind::Output };
        ring.push(header, &[0u8; 32]);
    }
    let messages = reader.drain();
    assert!(!messages.is_empty());
    for message in &messages {
        assert_eq!(message.header.queue_kind, QueueKind::Output);
        assert_eq!(message.payload.len(), 32);
    }
}
