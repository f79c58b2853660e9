use crate::fwstate::{HashKind, SyncTransportConfig, Timeouts};
use serde::Deserialize;
use std::net::Ipv6Addr;

/// On-disk TTL table (spec.md §3 "timeouts"), one field per
/// [`Timeouts`] field with the same defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    #[serde(default = "default_udp")]
    pub udp: u64,
    #[serde(default = "default_tcp")]
    pub tcp: u64,
    #[serde(default = "default_tcp_syn")]
    pub tcp_syn: u64,
    #[serde(default = "default_tcp_syn_ack")]
    pub tcp_syn_ack: u64,
    #[serde(default = "default_tcp_fin")]
    pub tcp_fin: u64,
    #[serde(default = "default_default")]
    pub default_: u64,
}

fn default_udp() -> u64 {
    Timeouts::default().udp
}
fn default_tcp() -> u64 {
    Timeouts::default().tcp
}
fn default_tcp_syn() -> u64 {
    Timeouts::default().tcp_syn
}
fn default_tcp_syn_ack() -> u64 {
    Timeouts::default().tcp_syn_ack
}
fn default_tcp_fin() -> u64 {
    Timeouts::default().tcp_fin
}
fn default_default() -> u64 {
    Timeouts::default().default_
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        let t = Timeouts::default();
        Self { udp: t.udp, tcp: t.tcp, tcp_syn: t.tcp_syn, tcp_syn_ack: t.tcp_syn_ack, tcp_fin: t.tcp_fin, default_: t.default_ }
    }
}

impl TimeoutsConfig {
    pub fn into_timeouts(self) -> Timeouts {
        Timeouts { udp: self.udp, tcp: self.tcp, tcp_syn: self.tcp_syn, tcp_syn_ack: self.tcp_syn_ack, tcp_fin: self.tcp_fin, default_: self.default_ }
    }
}

/// On-disk sync transport settings (spec.md §6 "Sync wire format",
/// transport section). Optional: a node with no peers configures no
/// `[fwstate.sync]` section and `FwState` runs with `sync_transport: None`.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub multicast_addr: Ipv6Addr,
    pub port: u16,
    pub local_addr: Ipv6Addr,
    #[serde(default)]
    pub interface_index: u32,
}

impl SyncConfig {
    pub fn into_transport_config(self) -> SyncTransportConfig {
        SyncTransportConfig { multicast_addr: self.multicast_addr, port: self.port, local_addr: self.local_addr, interface_index: self.interface_index }
    }
}

/// On-disk `fwstate` section: the TTL-map sizing plus the per-protocol
/// timeout table and optional sync transport (spec.md §3 "fwmap", §4.6).
#[derive(Debug, Clone, Deserialize)]
pub struct FwstateConfig {
    /// Must be a power of two (spec.md §3 "array of `index_size` entries
    /// (power of two)").
    pub index_size: usize,
    pub shard_count: usize,
    #[serde(default)]
    pub hash_fn: HashKind,
    #[serde(default)]
    pub seed: u32,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub sync: Option<SyncConfig>,
}
