use serde::Deserialize;

/// Per-node identity and shared-memory sizing (spec.md §4.1 "one arena per
/// NUMA node", §1 "a control-plane process initializes shared memory").
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// NUMA node this instance's arena is pinned to. Purely advisory at
    /// this layer — nothing here calls into libnuma — but carried through
    /// so the introspection API can report it (spec.md §6).
    #[serde(default)]
    pub numa_idx: u32,
    /// Size in bytes of the dataplane-visible arena (fwmap slots, layer
    /// maps, compiled ACL tables).
    pub dp_memory_bytes: usize,
    /// Size in bytes of the control-plane-only arena (staging buffers for
    /// a recompile in flight, before publish).
    pub cp_memory_bytes: usize,
}
