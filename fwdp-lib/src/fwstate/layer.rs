//! Layer map: the generational chain of fwmaps (spec.md §4.7, §3 "Layer
//! map").
//!
//! The chain is published as a single immutable snapshot (`Arc<Vec<…>>`)
//! swapped atomically via [`arc_swap::ArcSwap`] rather than literal
//! singly-linked nodes with per-node next-pointers: the spec's actual
//! requirement is "workers reading the head at any moment see either the
//! old head or the new head, consistently" (§4.7 "`insert_new_layer`"),
//! which one release-ordered whole-snapshot swap gives directly, without
//! a thread needing to re-walk a chain whose tail could be concurrently
//! rewritten underneath it. `layers[0]` is always the active layer `L0`.

use super::map::{Fwmap, MapKey, MergeValue};
use std::sync::Arc;

use arc_swap::ArcSwap;

pub struct LayerEntry<K, V> {
    pub map: Arc<Fwmap<K, V>>,
    pub created_at: u64,
}

/// `layermap_get_value_and_deadline` result.
pub struct LayerLookup<V> {
    pub value: V,
    pub deadline: u64,
    /// True if the hit layer was not `L0` — the caller should re-emit
    /// this state into a sync packet so peers refresh it into their own
    /// `L0` (spec.md §3 Layer map invariant).
    pub stale_from_old_layer: bool,
}

pub struct LayerMap<K, V> {
    layers: ArcSwap<Vec<LayerEntry<K, V>>>,
}

impl<K: MapKey, V: MergeValue> LayerMap<K, V> {
    pub fn new(initial: Fwmap<K, V>, now: u64) -> Self {
        let entry = LayerEntry { map: Arc::new(initial), created_at: now };
        Self { layers: ArcSwap::new(Arc::new(vec![entry])) }
    }

    pub fn layer_count(&self) -> usize {
        self.layers.load().len()
    }

    /// `put(active, worker, now, ttl, key, value)`: writes only to `L0`.
    pub fn put(&self, worker_idx: usize, now: u64, ttl: u64, key: K, value: V) -> crate::error::Result<super::map::PutOutcome> {
        let snapshot = self.layers.load();
        let head = &snapshot.first().expect("layer map always has at least one layer").map;
        head.put(worker_idx, now, ttl, key, value)
    }

    /// `get_value_and_deadline`: probes layers in order, `L0` first.
    pub fn get_value_and_deadline(&self, now: u64, key: &K) -> Option<LayerLookup<V>> {
        let snapshot = self.layers.load();
        for (idx, layer) in snapshot.iter().enumerate() {
            if let Some((value, deadline)) = layer.map.get(now, key) {
                return Some(LayerLookup { value, deadline, stale_from_old_layer: idx > 0 });
            }
        }
        None
    }

    /// `insert_new_layer`: control-plane operation. Prepends a fresh
    /// empty fwmap as the new `L0`, demoting the old `L0` to `L1`.
    /// Subsequent `put`s land in the new layer; existing entries in
    /// older layers remain readable (and reported stale) until they
    /// expire or their layer is trimmed.
    pub fn insert_new_layer(&self, new_head: Fwmap<K, V>, now: u64) {
        let current = self.layers.load();
        let mut next = Vec::with_capacity(current.len() + 1);
        next.push(LayerEntry { map: Arc::new(new_head), created_at: now });
        next.extend(current.iter().map(|e| LayerEntry { map: e.map.clone(), created_at: e.created_at }));
        self.layers.store(Arc::new(next));
    }

    /// `trim_stale_layers(now, mctx, min_age)`: drops trailing layers
    /// (everything but `L0`) whose `live_estimate()` has reached zero and
    /// which are at least `min_age` old, publishing a shorter snapshot.
    /// Returns the trimmed layers so the caller can defer their actual
    /// destruction ("`outdated_layers_free`") past a worker-batch grace
    /// period (spec.md §4.7 "Grace-period rationale").
    pub fn trim_stale_layers(&self, now: u64, min_age: u64) -> Vec<LayerEntry<K, V>> {
        let current = self.layers.load();
        if current.len() <= 1 {
            return Vec::new();
        }

        // Find the longest stale suffix (everything from the tail
        // inward that is fully expired), never touching L0.
        let mut cut = current.len();
        for idx in (1..current.len()).rev() {
            let layer = &current[idx];
            let age_ok = now.saturating_sub(layer.created_at) >= min_age;
            if layer.map.live_estimate() <= 0 && age_ok {
                cut = idx;
            } else {
                break;
            }
        }
        if cut == current.len() {
            return Vec::new();
        }

        let kept: Vec<LayerEntry<K, V>> =
            current[..cut].iter().map(|e| LayerEntry { map: e.map.clone(), created_at: e.created_at }).collect();
        let trimmed: Vec<LayerEntry<K, V>> =
            current[cut..].iter().map(|e| LayerEntry { map: e.map.clone(), created_at: e.created_at }).collect();
        self.layers.store(Arc::new(kept));
        trimmed
    }
}
