//! Per-worker lock-free overwrite ring buffer for captured packets
//! (spec.md §3 "Pdump ring", §4.9).
//!
//! One [`PdumpRing`] (the producer half, owned exclusively by the
//! worker that captures into it) and one [`PdumpReader`] (the consumer
//! half, held by the control-plane reader thread) share a fixed-size
//! byte buffer plus one atomic `write_idx`. The producer side requires
//! `&mut self` so the single-producer discipline is enforced by the
//! borrow checker rather than documented convention; the reader side is
//! `&self` and may run concurrently with the producer, consistent with
//! spec.md §4.9's "single producer, multi consumer" note (the consumer
//! here is the one control-plane reader thread, not many).
//!
//! `checkpoint` is the single release-ordered publication point: any
//! reader that observes an advanced `write_idx` is guaranteed (per the
//! spec's ordering guarantee) to see the payload bytes written before
//! it, because all writes into the buffer happen-before the `Release`
//! store and the reader's `Acquire` load happens-before it reads those
//! bytes back out.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const RING_MSG_MAGIC: u32 = 0xDEAD_BEEF;
pub const RING_MSG_HDR_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueKind {
    Output = 0,
    Drop = 1,
    Bypass = 2,
}

impl QueueKind {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(QueueKind::Output),
            1 => Some(QueueKind::Drop),
            2 => Some(QueueKind::Bypass),
            _ => None,
        }
    }
}

/// `ring_msg_hdr` (spec.md §3). `total_len` covers header + payload and
/// is always a multiple of 4 so a reader can scan forward past a message
/// it doesn't care about without re-parsing its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingMsgHeader {
    pub total_len: u32,
    pub packet_len: u32,
    pub timestamp: u64,
    pub worker_idx: u32,
    pub pipeline_idx: u32,
    pub rx_device: u16,
    pub tx_device: u16,
    pub queue_kind: QueueKind,
}

impl RingMsgHeader {
    fn encode(&self, out: &mut [u8; RING_MSG_HDR_LEN]) {
        out[0..4].copy_from_slice(&self.total_len.to_le_bytes());
        out[4..8].copy_from_slice(&RING_MSG_MAGIC.to_le_bytes());
        out[8..12].copy_from_slice(&self.packet_len.to_le_bytes());
        out[12..20].copy_from_slice(&self.timestamp.to_le_bytes());
        out[20..24].copy_from_slice(&self.worker_idx.to_le_bytes());
        out[24..28].copy_from_slice(&self.pipeline_idx.to_le_bytes());
        out[28..30].copy_from_slice(&self.rx_device.to_le_bytes());
        out[30..32].copy_from_slice(&self.tx_device.to_le_bytes());
        out[32] = self.queue_kind as u8;
        out[33..36].copy_from_slice(&[0, 0, 0]);
    }

    /// Returns `None` (rather than an error) on a magic mismatch: the
    /// caller treats that as "ring was overrun here, resynchronize",
    /// never as a hard failure (spec.md §4.9 reader protocol).
    fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < RING_MSG_HDR_LEN {
            return None;
        }
        let total_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let magic = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        if magic != RING_MSG_MAGIC {
            return None;
        }
        let packet_len = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let timestamp = u64::from_le_bytes(bytes[12..20].try_into().unwrap());
        let worker_idx = u32::from_le_bytes(bytes[20..24].try_into().unwrap());
        let pipeline_idx = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
        let rx_device = u16::from_le_bytes(bytes[28..30].try_into().unwrap());
        let tx_device = u16::from_le_bytes(bytes[30..32].try_into().unwrap());
        let queue_kind = QueueKind::from_u8(bytes[32])?;
        Some(Self { total_len, packet_len, timestamp, worker_idx, pipeline_idx, rx_device, tx_device, queue_kind })
    }
}

/// Round `n` up to the next multiple of 4 (spec.md §4.9 `align4`).
pub fn align4(n: usize) -> usize {
    (n + 3) & !3
}

struct RingShared {
    data: UnsafeCell<Box<[u8]>>,
    size: usize,
    mask: usize,
    write_idx: AtomicU64,
}

// SAFETY: `data` is only ever written by the single `PdumpRing` producer
// holding `&mut self`, and only ever read by `PdumpReader`s through
// shared bytes whose validity is bounded by `write_idx`'s Acquire load.
// This is the standard SPSC-ring unsafe-cell pattern: the atomic index
// is the synchronization edge, not a lock over the byte buffer itself.
unsafe impl Send for RingShared {}
unsafe impl Sync for RingShared {}

/// Producer (writer) handle — one per worker. Not `Clone`: the type
/// system enforces the single-producer discipline spec.md §4.9 assumes.
pub struct PdumpRing {
    shared: Arc<RingShared>,
    /// Producer-local "everything before this offset has been reclaimed
    /// by overwrite" cursor (spec.md §3 `readable_idx`). Never touched
    /// by the reader.
    readable_idx: u64,
}

/// Consumer (reader) handle — the control-plane reader thread's view of
/// the same ring.
pub struct PdumpReader {
    shared: Arc<RingShared>,
    read_idx: u64,
}

/// Create a paired producer/consumer handle over a ring of `size` bytes
/// (spec.md §3 "sizes power of two").
pub fn new_ring(size: usize) -> crate::error::Result<(PdumpRing, PdumpReader)> {
    if size == 0 || !size.is_power_of_two() {
        return Err(crate::error::FwdpError::InvalidArgument(format!("pdump ring size {size} must be a non-zero power of two")));
    }
    let shared = Arc::new(RingShared {
        data: UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
        size,
        mask: size - 1,
        write_idx: AtomicU64::new(0),
    });
    let writer = PdumpRing { shared: shared.clone(), readable_idx: 0 };
    let reader = PdumpReader { shared, read_idx: 0 };
    Ok((writer, reader))
}

impl PdumpRing {
    /// `prepare(ring, data, aligned_payload_size)`: reclaim space ahead
    /// of the write cursor by skipping past however many old messages
    /// the new message would otherwise overwrite.
    fn prepare(&mut self, aligned_size: usize) {
        let size = self.shared.size as u64;
        let write_idx = self.shared.write_idx.load(Ordering::Relaxed);
        while write_idx.saturating_sub(self.readable_idx) > size - aligned_size as u64 {
            let pos = (self.readable_idx & self.shared.mask as u64) as usize;
            let total_len = self.peek_total_len(pos);
            let advance = align4(total_len.max(4) as usize) as u64;
            let next = self.readable_idx.saturating_add(advance.max(1));
            // Ring corrupted or message spans past write_idx: clamp and
            // stop (spec.md §4.9 "best effort").
            self.readable_idx = next.min(write_idx);
            if self.readable_idx >= write_idx {
                break;
            }
        }
    }

    fn peek_total_len(&self, pos: usize) -> u32 {
        // SAFETY: every message's total_len word is written 4-byte
        // aligned and fully before the checkpoint that makes it visible
        // to reclamation, so reading 4 bytes at `pos` is always in
        // bounds and well-formed (or zeroed initial memory, handled by
        // the `.max(1)` advance above so a zero length cannot stall).
        let data = unsafe { &*self.shared.data.get() };
        if pos + 4 > data.len() {
            return 0;
        }
        u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap())
    }

    /// `write(ring, data, offset, bytes)`: copy `bytes` into the ring at
    /// `write_idx + offset`, splitting across the wraparound point.
    fn write_at(&mut self, offset: usize, bytes: &[u8]) {
        let mask = self.shared.mask;
        let write_idx = self.shared.write_idx.load(Ordering::Relaxed) as usize;
        let start = (write_idx + offset) & mask;
        let size = self.shared.size;
        // SAFETY: single producer holds `&mut self`; no reader ever
        // writes, and the reader only observes bytes behind the
        // Acquire-loaded `write_idx`, which this function's caller
        // advances only after this copy completes (`checkpoint`).
        let data = unsafe { &mut *self.shared.data.get() };
        let first_len = (size - start).min(bytes.len());
        data[start..start + first_len].copy_from_slice(&bytes[..first_len]);
        if first_len < bytes.len() {
            data[0..bytes.len() - first_len].copy_from_slice(&bytes[first_len..]);
        }
    }

    /// `checkpoint(ring, size)`: publish `align4(size)` bytes as now
    /// readable, with `Release` ordering.
    fn checkpoint(&mut self, size: usize) {
        self.shared.write_idx.fetch_add(align4(size) as u64, Ordering::Release);
    }

    /// Capture one message: reclaims space, writes the header + payload,
    /// and publishes it in one call. `total_len` in the header is
    /// computed here, not supplied by the caller.
    pub fn push(&mut self, mut header: RingMsgHeader, payload: &[u8]) {
        let total_len = (RING_MSG_HDR_LEN + payload.len()) as u32;
        header.total_len = total_len;
        let aligned = align4(total_len as usize);
        self.prepare(aligned);

        let mut hdr_bytes = [0u8; RING_MSG_HDR_LEN];
        header.encode(&mut hdr_bytes);
        self.write_at(0, &hdr_bytes);
        self.write_at(RING_MSG_HDR_LEN, payload);
        self.checkpoint(aligned);
    }
}

/// One message as handed back to the consumer.
#[derive(Debug, Clone)]
pub struct CapturedMessage {
    pub header: RingMsgHeader,
    pub payload: Vec<u8>,
}

impl PdumpReader {
    /// Read every message published since the last call. On a magic
    /// mismatch (the ring wrapped past where this reader last looked),
    /// resynchronize by jumping straight to the current `write_idx`
    /// snapshot rather than attempting to recover byte-by-byte (spec.md
    /// §4.9 reader protocol).
    pub fn drain(&mut self) -> Vec<CapturedMessage> {
        let write_idx = self.shared.write_idx.load(Ordering::Acquire);
        let mask = self.shared.mask;
        let mut out = Vec::new();

        while self.read_idx < write_idx {
            let pos = (self.read_idx & mask as u64) as usize;
            let header_bytes = self.read_contiguous(pos, RING_MSG_HDR_LEN, write_idx);
            let Some(header) = RingMsgHeader::decode(&header_bytes) else {
                // Resync: the slot at `pos` is stale or overwritten.
                self.read_idx = write_idx;
                break;
            };
            let payload_len = header.total_len as usize - RING_MSG_HDR_LEN;
            let payload = self.read_contiguous((pos + RING_MSG_HDR_LEN) % self.shared.size, payload_len, write_idx);
            let advance = align4(header.total_len as usize) as u64;
            out.push(CapturedMessage { header, payload });
            self.read_idx = self.read_idx.saturating_add(advance.max(1));
        }
        out
    }

    fn read_contiguous(&self, start: usize, len: usize, write_idx_snapshot: u64) -> Vec<u8> {
        let size = self.shared.size;
        let _ = write_idx_snapshot;
        // SAFETY: the Acquire load of `write_idx` above happens-after
        // every byte of this message's producer-side write, per the
        // single release-ordered publication guarantee (spec.md §4.9
        // "Ordering guarantee"); reading these bytes is therefore sound
        // even though the producer may concurrently be writing bytes
        // further ahead in the ring.
        let data = unsafe { &*self.shared.data.get() };
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(data[(start + i) % size]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(packet_len: u32) -> RingMsgHeader {
        RingMsgHeader {
            total_len: 0,
            packet_len,
            timestamp: 42,
            worker_idx: 0,
            pipeline_idx: 0,
            rx_device: 1,
            tx_device: 2,
            queue_kind: QueueKind::Output,
        }
    }

    #[test]
    fn header_round_trips_through_encode_decode() {
        let h = header(100);
        let mut bytes = [0u8; RING_MSG_HDR_LEN];
        let mut full = h;
        full.total_len = RING_MSG_HDR_LEN as u32;
        full.encode(&mut bytes);
        let decoded = RingMsgHeader::decode(&bytes).expect("valid magic");
        assert_eq!(decoded, full);
    }

    #[test]
    fn magic_mismatch_returns_none() {
        let bytes = [0u8; RING_MSG_HDR_LEN];
        assert!(RingMsgHeader::decode(&bytes).is_none());
    }

    #[test]
    fn single_message_round_trips_through_ring() {
        let (mut writer, mut reader) = new_ring(1024).unwrap();
        writer.push(header(10), &[1, 2, 3, 4]);
        let msgs = reader.drain();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].payload, vec![1, 2, 3, 4]);
        assert_eq!(msgs[0].header.packet_len, 10);
    }

    #[test]
    fn rejects_non_power_of_two_size() {
        assert!(new_ring(100).is_err());
    }

    #[test]
    fn overflow_keeps_reader_and_writer_idx_bounded() {
        // S5: ring size 128, 10 messages of header+32-byte payload each.
        let (mut writer, mut reader) = new_ring(128).unwrap();
        for i in 0..10u32 {
            writer.push(header(i), &[0u8; 32]);
        }
        let write_idx = writer.shared.write_idx.load(Ordering::Relaxed);
        assert!(write_idx - writer.readable_idx <= 128);
        let msgs = reader.drain();
        // Only the most recent messages that fit in 128 bytes survive;
        // every one returned must have a valid decode (no magic churn
        // reaches the caller as garbage).
        assert!(!msgs.is_empty());
        for m in &msgs {
            assert_eq!(m.header.queue_kind, QueueKind::Output);
        }
    }

    #[test]
    fn align4_rounds_up() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(5), 8);
    }

    #[test]
    fn multiple_messages_drain_in_order() {
        let (mut writer, mut reader) = new_ring(4096).unwrap();
        for i in 0..5u32 {
            writer.push(header(i), &[i as u8; 8]);
        }
        let msgs = reader.drain();
        assert_eq!(msgs.len(), 5);
        for (i, m) in msgs.iter().enumerate() {
            assert_eq!(m.header.packet_len, i as u32);
        }
        // A second drain with nothing new published returns empty.
        assert!(reader.drain().is_empty());
    }
}
