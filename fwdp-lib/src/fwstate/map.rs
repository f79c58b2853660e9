//! Sharded TTL hash table — `fwmap` (spec.md §4.6, §3 "fwmap (TTL map)").
//!
//! Structurally this keeps the spec's two-tier split: a `buckets` index
//! (fingerprint-prefiltered pointers) separate from a per-worker-sharded
//! `slots` backing store. The spec's fixed-capacity primary bucket plus a
//! chained `extra_buckets` overflow pool is collapsed here into one
//! growable `Vec<BucketEntry>` per bucket — safe Rust has no use for a
//! separate overflow pool keyed off a fixed inline array, since `Vec`
//! already amortizes growth; the fingerprint-prefilter and
//! one-shard-per-writer properties that actually matter for the
//! concurrency story are preserved exactly.
//!
//! Per-bucket locking uses [`RwCell`](crate::sync_prim::RwCell) — readers
//! shared, writer exclusive, fair (no writer starvation under read
//! pressure). Shard storage is additionally behind a short-lived
//! [`Mutex`] so a reader can touch the slot holding the value it found
//! via the bucket index; because only the owning worker ever writes to
//! its own shard, this mutex is never contended by another writer, only
//! briefly by readers resolving a hit (spec.md §4.6 "Sharding
//! rationale").

use super::hash::HashKind;
use crate::error::{FwdpError, Result};
use crate::sync_prim::RwCell;
use std::sync::Mutex;

/// A key usable in a [`Fwmap`]: compared for equality on merge/lookup and
/// turned into bytes for hashing.
pub trait MapKey: Copy + Eq + Send {
    fn hash_input(&self) -> Vec<u8>;
}

/// A value mergeable in place per spec.md §4.6 "`put` never displaces a
/// live entry with the same key — it merges."
pub trait MergeValue: Clone + Send {
    fn merge(&self, new: &Self) -> Self;
}

struct BucketEntry {
    fingerprint: u32,
    shard_id: u32,
    slot_idx: u32,
    deadline: u64,
}

struct Slot<K, V> {
    key: K,
    value: V,
    deadline: u64,
    created_at: u64,
    live: bool,
}

struct ShardStorage<K, V> {
    slots: Vec<Slot<K, V>>,
    free: Vec<u32>,
}

impl<K, V> ShardStorage<K, V> {
    fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new() }
    }

    fn alloc(&mut self, key: K, value: V, now: u64, deadline: u64) -> u32 {
        if let Some(idx) = self.free.pop() {
            self.slots[idx as usize] = Slot { key, value, deadline, created_at: now, live: true };
            return idx;
        }
        self.slots.push(Slot { key, value, deadline, created_at: now, live: true });
        (self.slots.len() - 1) as u32
    }
}

/// Outcome of a [`Fwmap::put`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Inserted,
    Merged,
}

/// One generation of the TTL-keyed state table. See module docs for the
/// index/slots split.
pub struct Fwmap<K, V> {
    buckets: Vec<RwCell<Vec<BucketEntry>>>,
    mask: u32,
    shards: Vec<Mutex<ShardStorage<K, V>>>,
    hash_kind: HashKind,
    seed: u32,
    created_at: u64,
    /// Approximate count of entries believed live, for the layer map's
    /// "stale" watermark (spec.md §4.7). Decremented best-effort when a
    /// get() observes an expired entry, incremented on insert; never
    /// exact under concurrent access, by design.
    live_estimate: std::sync::atomic::AtomicI64,
}

impl<K: MapKey, V: MergeValue> Fwmap<K, V> {
    /// `index_size` must be a power of two (spec.md §3 "array of
    /// `index_size` entries (power of two)"). `shard_count` is normally
    /// the worker count.
    pub fn new(index_size: usize, shard_count: usize, hash_kind: HashKind, seed: u32, created_at: u64) -> Result<Self> {
        if index_size == 0 || !index_size.is_power_of_two() {
            return Err(FwdpError::InvalidArgument(format!("fwmap index_size {index_size} must be a non-zero power of two")));
        }
        if shard_count == 0 {
            return Err(FwdpError::InvalidArgument("fwmap shard_count must be > 0".into()));
        }
        Ok(Self {
            buckets: (0..index_size).map(|_| RwCell::new(Vec::new())).collect(),
            mask: (index_size - 1) as u32,
            shards: (0..shard_count).map(|_| Mutex::new(ShardStorage::new())).collect(),
            hash_kind,
            seed,
            created_at,
            live_estimate: std::sync::atomic::AtomicI64::new(0),
        })
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Best-effort count of entries this layer believes are still live.
    pub fn live_estimate(&self) -> i64 {
        self.live_estimate.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn locate(&self, key: &K) -> (usize, u32) {
        let bytes = key.hash_input();
        let h = self.hash_kind.hash(self.seed, &bytes);
        ((h & self.mask) as usize, h)
    }

    /// `put(worker_idx, now, ttl, key, value)`: inserts into this layer,
    /// merging into an existing live entry with the same key if present.
    /// Writes the new slot into `worker_idx`'s own shard only (spec.md
    /// §4.6 invariant: "a live slot's shard id equals the worker id that
    /// last wrote it").
    pub fn put(&self, worker_idx: usize, now: u64, ttl: u64, key: K, value: V) -> Result<PutOutcome> {
        if worker_idx >= self.shards.len() {
            return Err(FwdpError::InvalidArgument(format!("worker_idx {worker_idx} out of range")));
        }
        let (bucket_idx, fingerprint) = self.locate(&key);
        let mut bucket = self.buckets[bucket_idx].write();

        for entry in bucket.iter_mut() {
            if entry.fingerprint != fingerprint {
                continue;
            }
            let mut shard = self.shards[entry.shard_id as usize].lock().expect("shard lock poisoned");
            if let Some(slot) = shard.slots.get_mut(entry.slot_idx as usize) {
                if slot.live && slot.key == key {
                    slot.value = slot.value.merge(&value);
                    slot.deadline = now + ttl;
                    entry.deadline = slot.deadline;
                    return Ok(PutOutcome::Merged);
                }
            }
        }

        let deadline = now + ttl;
        let mut shard = self.shards[worker_idx].lock().expect("shard lock poisoned");
        let slot_idx = shard.alloc(key, value, now, deadline);
        drop(shard);
        bucket.push(BucketEntry { fingerprint, shard_id: worker_idx as u32, slot_idx, deadline });
        self.live_estimate.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(PutOutcome::Inserted)
    }

    /// `get(now, key)`: read-side lookup. Entries with `deadline < now`
    /// are treated as a miss and lazily marked free in their shard
    /// (spec.md §4.6 "Eviction. Lazy"). Returns a snapshot of the value
    /// and its deadline.
    pub fn get(&self, now: u64, key: &K) -> Option<(V, u64)> {
        let (bucket_idx, fingerprint) = self.locate(key);
        let bucket = self.buckets[bucket_idx].read();

        for entry in bucket.iter() {
            if entry.fingerprint != fingerprint {
                continue;
            }
            let mut shard = self.shards[entry.shard_id as usize].lock().expect("shard lock poisoned");
            let Some(slot) = shard.slots.get_mut(entry.slot_idx as usize) else { continue };
            if !slot.live || slot.key != *key {
                continue;
            }
            if slot.deadline < now {
                slot.live = false;
                shard.free.push(entry.slot_idx);
                self.live_estimate.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            }
            return Some((slot.value.clone(), slot.deadline));
        }
        None
    }
}
