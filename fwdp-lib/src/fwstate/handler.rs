//! Ordinary-traffic state lookup and sync-packet ingestion/emission
//! (spec.md §4.8).
//!
//! [`FwState`] plays two roles: as an [`StateChecker`] it answers the
//! ACL module's `check_state`/`create_state` calls without the ACL
//! module ever depending on this module's concrete types; as a
//! [`PipelineModule`] it is the stage that recognizes sync packets
//! addressed to the configured multicast group, applies externally
//! received ones to local state, and stamps/forwards internally
//! originated ones.
//!
//! A lookup for return traffic tries the packet's own 5-tuple first
//! (covers the flow's forward direction), then the reversed tuple
//! (covers return traffic against a forward-canonicalized key) — see
//! [`crate::fwstate::key`] module docs.

use super::hash::HashKind;
use super::key::{Fw4Key, Fw6Key, FwStateValue, FWSTATE_ACK, FWSTATE_FIN, FWSTATE_SYN};
use super::layer::LayerMap;
use super::map::Fwmap;
use super::sync::{self, SyncFrame, SyncTransportConfig, ADDR_TYPE_IP4, ADDR_TYPE_IP6};
use crate::acl::handler::StateChecker;
use crate::error::{FwdpError, Result};
use crate::pipeline::{EtherType, HandlerContext, L3L4Fields, ModuleKind, PacketFront, PipelineModule};
use std::net::{Ipv4Addr, Ipv6Addr};
use tracing::Level;

/// Per-protocol TTL table (spec.md §3 "timeouts"). `udp`, `tcp`, and
/// `default_` are named directly by spec.md; `tcp_syn`/`tcp_syn_ack`/
/// `tcp_fin` are this crate's own reasonable defaults for the
/// connection-setup/teardown refinement spec.md leaves unspecified
/// (DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub udp: u64,
    pub tcp: u64,
    pub tcp_syn: u64,
    pub tcp_syn_ack: u64,
    pub tcp_fin: u64,
    pub default_: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self { udp: 30, tcp: 120, tcp_syn: 120, tcp_syn_ack: 60, tcp_fin: 30, default_: 16 }
    }
}

impl Timeouts {
    /// Resolve a TTL in seconds for this protocol/flags combination.
    /// `ack` takes precedence over a bare `syn`; `fin` always wins last
    /// regardless of the other bits set.
    pub fn ttl_seconds(&self, proto: u8, tcp_flags: u8) -> u64 {
        match proto {
            6 => {
                let mut ttl = self.tcp;
                if tcp_flags & FWSTATE_ACK != 0 {
                    ttl = self.tcp_syn_ack;
                } else if tcp_flags & FWSTATE_SYN != 0 {
                    ttl = self.tcp_syn;
                }
                if tcp_flags & FWSTATE_FIN != 0 {
                    ttl = self.tcp_fin;
                }
                ttl
            }
            17 => self.udp,
            _ => self.default_,
        }
    }

    fn ttl_ns(&self, proto: u8, tcp_flags: u8) -> u64 {
        self.ttl_seconds(proto, tcp_flags).saturating_mul(1_000_000_000)
    }
}

/// A richer lookup result than the [`StateChecker`] trait's bare
/// `bool`, for callers (tests, a future sync scheduler) that need to
/// know whether this hit should trigger a re-announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLookup {
    pub hit: bool,
    /// The matching entry lives in a non-head layer, or its deadline is
    /// within the refresh window — either way a peer's view of this
    /// flow may be stale and it should be re-announced (spec.md §4.7
    /// layer map invariant; refresh window grounded on the map's own
    /// TTL granularity).
    pub sync_required: bool,
}

const SYNC_REFRESH_WINDOW_NS: u64 = 8_000_000_000;

/// The stateful firewall: one generational layer map per address family,
/// plus the sync transport this node re-announces over (spec.md §1 item
/// 1, §4.6, §4.7, §4.8).
pub struct FwState {
    name: String,
    v4: LayerMap<Fw4Key, FwStateValue>,
    v6: LayerMap<Fw6Key, FwStateValue>,
    timeouts: Timeouts,
    sync_transport: Option<SyncTransportConfig>,
}

impl FwState {
    pub fn new(
        name: impl Into<String>,
        index_size: usize,
        shard_count: usize,
        hash_kind: HashKind,
        seed: u32,
        now: u64,
        timeouts: Timeouts,
        sync_transport: Option<SyncTransportConfig>,
    ) -> Result<Self> {
        let v4_map = Fwmap::new(index_size, shard_count, hash_kind, seed, now)?;
        let v6_map = Fwmap::new(index_size, shard_count, hash_kind, seed, now)?;
        Ok(Self { name: name.into(), v4: LayerMap::new(v4_map, now), v6: LayerMap::new(v6_map, now), timeouts, sync_transport })
    }

    /// Control-plane rotation (spec.md §4.7 `insert_new_layer`):
    /// demotes the current head in both families to `L1` and starts a
    /// fresh empty `L0`.
    pub fn insert_new_layer(&self, index_size: usize, shard_count: usize, hash_kind: HashKind, seed: u32, now: u64) -> Result<()> {
        self.v4.insert_new_layer(Fwmap::new(index_size, shard_count, hash_kind, seed, now)?, now);
        self.v6.insert_new_layer(Fwmap::new(index_size, shard_count, hash_kind, seed, now)?, now);
        Ok(())
    }

    /// Drops fully-expired trailing layers in both families, returning
    /// them for the caller to hold across a worker-batch grace period
    /// before actually freeing them (spec.md §4.7 "Grace-period
    /// rationale").
    pub fn trim_stale_layers(&self, now: u64, min_age: u64) -> (usize, usize) {
        let v4 = self.v4.trim_stale_layers(now, min_age);
        let v6 = self.v6.trim_stale_layers(now, min_age);
        (v4.len(), v6.len())
    }

    fn lookup_v4(&self, worker_idx: usize, now: u64, seen: Fw4Key) -> StateLookup {
        if let Some(hit) = self.v4.get_value_and_deadline(now, &seen) {
            return self.touch_v4(worker_idx, now, seen, hit, true);
        }
        let reversed = seen.reversed();
        if let Some(hit) = self.v4.get_value_and_deadline(now, &reversed) {
            return self.touch_v4(worker_idx, now, reversed, hit, false);
        }
        StateLookup { hit: false, sync_required: false }
    }

    fn touch_v4(&self, worker_idx: usize, now: u64, canonical_key: Fw4Key, hit: super::layer::LayerLookup<FwStateValue>, forward: bool) -> StateLookup {
        let delta = FwStateValue {
            external: hit.value.external,
            proto_type: hit.value.proto_type,
            flags: 0,
            packets_forward: forward as u64,
            packets_backward: (!forward) as u64,
            packets_since_last_sync: hit.value.packets_since_last_sync + 1,
            last_sync: hit.value.last_sync,
        };
        let ttl = self.timeouts.ttl_ns(hit.value.proto_type, hit.value.flags);
        let _ = self.v4.put(worker_idx, now, ttl, canonical_key, delta);
        StateLookup { hit: true, sync_required: hit.stale_from_old_layer || hit.deadline.saturating_sub(now) < SYNC_REFRESH_WINDOW_NS }
    }

    fn lookup_v6(&self, worker_idx: usize, now: u64, seen: Fw6Key) -> StateLookup {
        if let Some(hit) = self.v6.get_value_and_deadline(now, &seen) {
            return self.touch_v6(worker_idx, now, seen, hit, true);
        }
        let reversed = seen.reversed();
        if let Some(hit) = self.v6.get_value_and_deadline(now, &reversed) {
            return self.touch_v6(worker_idx, now, reversed, hit, false);
        }
        StateLookup { hit: false, sync_required: false }
    }

    fn touch_v6(&self, worker_idx: usize, now: u64, canonical_key: Fw6Key, hit: super::layer::LayerLookup<FwStateValue>, forward: bool) -> StateLookup {
        let delta = FwStateValue {
            external: hit.value.external,
            proto_type: hit.value.proto_type,
            flags: 0,
            packets_forward: forward as u64,
            packets_backward: (!forward) as u64,
            packets_since_last_sync: hit.value.packets_since_last_sync + 1,
            last_sync: hit.value.last_sync,
        };
        let ttl = self.timeouts.ttl_ns(hit.value.proto_type, hit.value.flags);
        let _ = self.v6.put(worker_idx, now, ttl, canonical_key, delta);
        StateLookup { hit: true, sync_required: hit.stale_from_old_layer || hit.deadline.saturating_sub(now) < SYNC_REFRESH_WINDOW_NS }
    }

    /// Full-detail lookup for ordinary data traffic, exposed directly
    /// for callers that need [`StateLookup::sync_required`] (the
    /// [`StateChecker`] trait impl below only surfaces the hit/miss
    /// bool).
    pub fn check_state_detailed(&self, worker_idx: usize, now: u64, ethertype: EtherType, fields: &L3L4Fields) -> StateLookup {
        match ethertype {
            EtherType::Ipv4 => {
                let key = Fw4Key::new(fields.proto, fields.src_v4, fields.src_port, fields.dst_v4, fields.dst_port);
                self.lookup_v4(worker_idx, now, key)
            }
            EtherType::Ipv6 => {
                let key = Fw6Key::new(fields.proto, fields.src_v6, fields.src_port, fields.dst_v6, fields.dst_port);
                self.lookup_v6(worker_idx, now, key)
            }
            EtherType::Other(_) => StateLookup { hit: false, sync_required: false },
        }
    }

    /// Apply one externally received sync frame to local state (spec.md
    /// §4.8): `external: true` is the only case this is called for —
    /// self-originated frames are never re-ingested, only re-stamped
    /// and forwarded.
    fn ingest_sync_frame(&self, worker_idx: usize, now: u64, frame: &SyncFrame) -> Result<()> {
        let value = FwStateValue {
            external: true,
            proto_type: frame.proto,
            flags: frame.flags,
            packets_forward: 0,
            packets_backward: 0,
            packets_since_last_sync: 0,
            last_sync: now,
        };
        let ttl = self.timeouts.ttl_ns(frame.proto, frame.flags);
        match frame.addr_type {
            ADDR_TYPE_IP4 => {
                let src = Ipv4Addr::from(frame.src_ip.to_be_bytes());
                let dst = Ipv4Addr::from(frame.dst_ip.to_be_bytes());
                let key = Fw4Key::new(frame.proto, src, frame.src_port, dst, frame.dst_port);
                self.v4.put(worker_idx, now, ttl, key, value)?;
                Ok(())
            }
            ADDR_TYPE_IP6 => {
                let src = Ipv6Addr::from(frame.src_ip6);
                let dst = Ipv6Addr::from(frame.dst_ip6);
                let key = Fw6Key::new(frame.proto, src, frame.src_port, dst, frame.dst_port);
                self.v6.put(worker_idx, now, ttl, key, value)?;
                Ok(())
            }
            other => Err(FwdpError::WireFormat(format!("unknown sync addr_type {other}"))),
        }
    }
}

impl StateChecker for FwState {
    fn check_state(&self, ctx: &HandlerContext<'_>, ethertype: EtherType, fields: &L3L4Fields) -> bool {
        self.check_state_detailed(ctx.worker_idx, ctx.now, ethertype, fields).hit
    }

    fn create_state(&self, ctx: &HandlerContext<'_>, ethertype: EtherType, fields: &L3L4Fields) {
        let value = FwStateValue::new_forward(fields.proto, fields.tcp_flags, ctx.now);
        let ttl = self.timeouts.ttl_ns(fields.proto, fields.tcp_flags);
        match ethertype {
            EtherType::Ipv4 => {
                let key = Fw4Key::new(fields.proto, fields.src_v4, fields.src_port, fields.dst_v4, fields.dst_port);
                let _ = self.v4.put(ctx.worker_idx, ctx.now, ttl, key, value);
            }
            EtherType::Ipv6 => {
                let key = Fw6Key::new(fields.proto, fields.src_v6, fields.src_port, fields.dst_v6, fields.dst_port);
                let _ = self.v6.put(ctx.worker_idx, ctx.now, ttl, key, value);
            }
            EtherType::Other(_) => {}
        }
    }
}

/// Sync-packet intake/emission stage (spec.md §4.8). Ordinary traffic
/// passes through to `output` untouched — the lookup for ordinary
/// traffic only happens via the [`StateChecker`] calls an ACL stage
/// makes earlier in the chain.
impl PipelineModule for FwState {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::FwState
    }

    fn handle(&self, front: &mut PacketFront, ctx: &HandlerContext<'_>) -> Result<()> {
        let Some(transport) = &self.sync_transport else {
            while let Some(descriptor) = front.pop_input() {
                front.to_output(descriptor);
            }
            return Ok(());
        };

        while let Some(mut descriptor) = front.pop_input() {
            let fields = match descriptor.fields() {
                Ok(fields) => fields,
                Err(_) => {
                    front.to_output(descriptor);
                    continue;
                }
            };
            let is_sync = descriptor.headers.ethertype == EtherType::Ipv6
                && fields.proto == 17
                && fields.dst_v6 == transport.multicast_addr
                && fields.dst_port == transport.port;
            if !is_sync {
                front.to_output(descriptor);
                continue;
            }

            let payload_start = descriptor.headers.l4_offset + 8;
            let bytes = descriptor.mbuf.as_bytes();
            if payload_start > bytes.len() {
                front.to_drop(descriptor);
                continue;
            }

            let external = SyncFrame::is_external_source(&fields.src_v6);
            match sync::decode_frames(&bytes[payload_start..]) {
                Ok(mut frames) => {
                    if external {
                        for frame in &frames {
                            if let Err(err) = self.ingest_sync_frame(ctx.worker_idx, ctx.now, frame) {
                                ctx.logger.event(Level::WARN, &format!("sync frame rejected: {err}"));
                            }
                        }
                        front.to_drop(descriptor);
                    } else {
                        for frame in frames.iter_mut() {
                            match frame.addr_type {
                                ADDR_TYPE_IP6 => frame.src_ip6 = transport.local_addr.octets(),
                                ADDR_TYPE_IP4 => {}
                                _ => {}
                            }
                        }
                        let re_encoded = sync::encode_frames(&frames);
                        let bytes = descriptor.mbuf.as_bytes_mut();
                        let end = (payload_start + re_encoded.len()).min(bytes.len());
                        bytes[payload_start..end].copy_from_slice(&re_encoded[..end - payload_start]);
                        front.to_bypass(descriptor);
                    }
                }
                Err(err) => {
                    ctx.logger.event(Level::WARN, &format!("malformed sync payload: {err}"));
                    front.to_drop(descriptor);
                }
            }
        }
        Ok(())
    }
}
