//! ACL compiler (spec.md §4.4): rules in, compiled join-chain artifacts
//! out.
//!
//! The compiler builds one [`RuleBitset`] per elementary cell of every
//! classifier dimension (src/dst net, src/dst port, proto+flags),
//! interns identical cells to small ids, and ANDs dimension ids together
//! through a chain of dense [`ValueTable`] joins exactly as spec.md §3
//! describes: `net = join(src_net, dst_net)`, `port = join(src_port,
//! dst_port)`, `transport = join(port, proto)`, `result = join(net,
//! transport)`. The final `result` id indexes a [`RangeRegistry`] entry
//! holding the matching rules' packed actions in declaration order.
//!
//! Net dimensions are LPM-backed: prefixes are inserted in ascending
//! length order, and each insertion looks up its own network address in
//! the table-so-far to find which less-specific (already-inserted)
//! rules already cover it, unioning that bitset with its own rule bit
//! before publishing a fresh id. This gives the same "every rule whose
//! prefix covers this address, not just the longest" semantics a naive
//! longest-match lookup would miss, for the common case of nested CIDR
//! rules (recorded as a compiler simplification in DESIGN.md: two
//! same-length prefixes that overlap without one containing the other
//! are not decomposed further).

use super::action::{pack_action, unpack_action, ActionKind};
use super::bitset::RuleBitset;
use super::value_table::{RangeRegistry, ValueTable};
use crate::error::{FwdpError, Result};
use crate::lpm::{Lpm, LPM_VALUE_INVALID};
use ipnet::IpNet;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Inclusive port range; `PortRange(0, 65535)` is the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange(pub u16, pub u16);

impl Default for PortRange {
    fn default() -> Self {
        PortRange(0, 65535)
    }
}

/// One compiler input rule (spec.md §4.4 "Input"). `None` on a field
/// means wildcard for that dimension.
#[derive(Debug, Clone)]
pub struct AclRule {
    pub devices: u16,
    pub src_net: Option<IpNet>,
    pub dst_net: Option<IpNet>,
    pub proto: Option<u8>,
    /// Bits that must be set in the packet's folded TCP flags for this
    /// rule to match; `None` means any flags.
    pub tcp_flags: Option<u8>,
    pub src_port: Option<PortRange>,
    pub dst_port: Option<PortRange>,
    pub action_kind: ActionKind,
    pub non_terminate: bool,
    pub action_flags: u8,
}

struct Interner {
    table: Vec<RuleBitset>,
    index: ahash::AHashMap<RuleBitset, u32>,
}

impl Interner {
    fn new() -> Self {
        Self { table: Vec::new(), index: ahash::AHashMap::default() }
    }

    fn intern(&mut self, bits: RuleBitset) -> u32 {
        if let Some(&id) = self.index.get(&bits) {
            return id;
        }
        let id = self.table.len() as u32;
        self.table.push(bits.clone());
        self.index.insert(bits, id);
        id
    }

    fn take(self) -> Vec<RuleBitset> {
        self.table
    }
}

fn intern_cells(cells: Vec<RuleBitset>) -> (Vec<u32>, Vec<RuleBitset>) {
    let mut interner = Interner::new();
    let ids = cells.into_iter().map(|bits| interner.intern(bits)).collect();
    (ids, interner.take())
}

fn join_dense(a: &[RuleBitset], b: &[RuleBitset]) -> (ValueTable, Vec<RuleBitset>) {
    let rows = a.len().max(1);
    let cols = b.len().max(1);
    let mut table = ValueTable::new(rows, cols, 0);
    let mut interner = Interner::new();
    for (ai, a_bits) in a.iter().enumerate() {
        for (bi, b_bits) in b.iter().enumerate() {
            let id = interner.intern(a_bits.and(b_bits));
            table.fill_range(ai as u32..ai as u32 + 1, bi as u32..bi as u32 + 1, id);
        }
    }
    (table, interner.take())
}

fn build_port_dimension(rules: &[AclRule], n: usize, pick: impl Fn(&AclRule) -> Option<PortRange>) -> (Vec<u32>, Vec<RuleBitset>) {
    let mut cells: Vec<RuleBitset> = (0..=u16::MAX as usize).map(|_| RuleBitset::new(n)).collect();
    for (i, rule) in rules.iter().enumerate() {
        let range = pick(rule).unwrap_or_default();
        for port in range.0..=range.1 {
            cells[port as usize].set(i);
            if port == u16::MAX {
                break;
            }
        }
    }
    intern_cells(cells)
}

/// Flags arriving at the classifier are already folded to fwstate's four
/// tracked bits (FIN/SYN/RST/ACK, [`crate::fwstate::key::fold_tcp_flags`]),
/// so the flags half of the composite index only needs 4 bits.
const PROTO_DIM_FLAG_BITS: usize = 4;
const PROTO_DIM_SIZE: usize = 256 * (1 << PROTO_DIM_FLAG_BITS);

/// Composite cell index `(tcp_flags << 8) | proto` (spec.md §4.4 "For
/// TCP, include `tcp_flags` in the proto input byte").
fn build_proto_dimension(rules: &[AclRule], n: usize) -> (Vec<u32>, Vec<RuleBitset>) {
    let mut cells: Vec<RuleBitset> = (0..PROTO_DIM_SIZE).map(|_| RuleBitset::new(n)).collect();
    for (i, rule) in rules.iter().enumerate() {
        let protos: Vec<u8> = match rule.proto {
            Some(p) => vec![p],
            None => (0..=u8::MAX).collect(),
        };
        for proto in protos {
            for flags in 0..(1 << PROTO_DIM_FLAG_BITS) as u8 {
                let matches = match rule.tcp_flags {
                    Some(required) => (flags & required) == required,
                    None => true,
                };
                if matches {
                    let composite = (proto as usize) | ((flags as usize) << 8);
                    cells[composite].set(i);
                }
            }
        }
    }
    intern_cells(cells)
}

fn net_bytes_for_family(net: &IpNet, key_len: usize) -> Option<(Vec<u8>, u8)> {
    match net {
        IpNet::V4(n) if key_len == 4 => Some((n.network().octets().to_vec(), n.prefix_len())),
        IpNet::V6(n) if key_len == 16 => Some((n.network().octets().to_vec(), n.prefix_len())),
        _ => None,
    }
}

/// Collect `(rule_idx, prefix_bytes, prefix_len)` for every rule that
/// applies to this address family on the given net dimension (wildcard
/// rules contribute a `/0` prefix; rules pinned to the other family
/// contribute nothing).
fn net_entries_for(rules: &[AclRule], key_len: usize, pick: impl Fn(&AclRule) -> &Option<IpNet>) -> Vec<(usize, Vec<u8>, u8)> {
    let mut entries = Vec::new();
    for (i, rule) in rules.iter().enumerate() {
        match pick(rule) {
            None => entries.push((i, vec![0u8; key_len], 0)),
            Some(net) => {
                if let Some((bytes, len)) = net_bytes_for_family(net, key_len) {
                    entries.push((i, bytes, len));
                }
            }
        }
    }
    entries
}

struct NetDimension {
    lpm: Lpm,
    bitsets: Vec<RuleBitset>,
}

impl NetDimension {
    fn lookup(&self, addr: &[u8]) -> u32 {
        let id = self.lpm.lookup(addr);
        if id == LPM_VALUE_INVALID {
            0
        } else {
            id
        }
    }
}

fn build_net_dimension(entries: &[(usize, Vec<u8>, u8)], key_len: usize, rule_count: usize) -> NetDimension {
    let mut sorted: Vec<&(usize, Vec<u8>, u8)> = entries.iter().collect();
    sorted.sort_by_key(|(_, _, len)| *len);

    let mut lpm = Lpm::new(key_len);
    let mut bitsets = vec![RuleBitset::new(rule_count)];

    for (rule_idx, prefix, len) in sorted {
        let existing = lpm.lookup(prefix);
        let base_id = if existing == LPM_VALUE_INVALID { 0 } else { existing as usize };
        let mut bits = bitsets[base_id].clone();
        bits.set(*rule_idx);
        bitsets.push(bits);
        let new_id = (bitsets.len() - 1) as u32;
        lpm.insert(prefix, *len as usize, new_id);
    }

    NetDimension { lpm, bitsets }
}

struct AclFamily {
    src_net: NetDimension,
    dst_net: NetDimension,
    net_join: ValueTable,
    result_join: ValueTable,
    result_registry: RangeRegistry,
}

fn build_family(rules: &[AclRule], key_len: usize, transport_bitsets: &[RuleBitset]) -> AclFamily {
    let src_entries = net_entries_for(rules, key_len, |r| &r.src_net);
    let dst_entries = net_entries_for(rules, key_len, |r| &r.dst_net);
    let src_net = build_net_dimension(&src_entries, key_len, rules.len());
    let dst_net = build_net_dimension(&dst_entries, key_len, rules.len());

    let (net_join, net_bitsets) = join_dense(&src_net.bitsets, &dst_net.bitsets);
    let (result_join, result_bitsets) = join_dense(&net_bitsets, transport_bitsets);

    let mut result_registry = RangeRegistry::new();
    for bits in &result_bitsets {
        let actions: Vec<u32> =
            bits.iter_set().map(|i| pack_action(rules[i].devices, rules[i].non_terminate, rules[i].action_kind, rules[i].action_flags)).collect();
        result_registry.push(actions);
    }

    AclFamily { src_net, dst_net, net_join, result_join, result_registry }
}

/// The compiled classifier for one rule set: both address families plus
/// the shared port/proto join chain (spec.md §4.4 "Output").
pub struct CompiledAcl {
    src_port_ids: Vec<u32>,
    dst_port_ids: Vec<u32>,
    port_join: ValueTable,
    proto_ids: Vec<u32>,
    transport_join: ValueTable,
    v4: AclFamily,
    v6: AclFamily,
}

impl CompiledAcl {
    fn transport_id(&self, src_port: u16, dst_port: u16, proto: u8, tcp_flags: u8) -> u32 {
        let src_id = self.src_port_ids[src_port as usize];
        let dst_id = self.dst_port_ids[dst_port as usize];
        let port_id = self.port_join.get(src_id, dst_id);
        let folded_flags = tcp_flags & ((1 << PROTO_DIM_FLAG_BITS) - 1);
        let composite = (proto as u32) | ((folded_flags as u32) << 8);
        let proto_id = self.proto_ids[composite as usize];
        self.transport_join.get(port_id, proto_id)
    }

    /// Resolve the ordered action list for an IPv4 5-tuple (spec.md
    /// §4.5 step 1).
    pub fn classify_v4(&self, src: Ipv4Addr, dst: Ipv4Addr, src_port: u16, dst_port: u16, proto: u8, tcp_flags: u8) -> &[u32] {
        let transport_id = self.transport_id(src_port, dst_port, proto, tcp_flags);
        let src_id = self.v4.src_net.lookup(&src.octets());
        let dst_id = self.v4.dst_net.lookup(&dst.octets());
        let net_id = self.v4.net_join.get(src_id, dst_id);
        let result_id = self.v4.result_join.get(net_id, transport_id);
        self.v4.result_registry.get(result_id)
    }

    /// Resolve the ordered action list for an IPv6 5-tuple (spec.md
    /// §4.5 step 2).
    pub fn classify_v6(&self, src: Ipv6Addr, dst: Ipv6Addr, src_port: u16, dst_port: u16, proto: u8, tcp_flags: u8) -> &[u32] {
        let transport_id = self.transport_id(src_port, dst_port, proto, tcp_flags);
        let src_id = self.v6.src_net.lookup(&src.octets());
        let dst_id = self.v6.dst_net.lookup(&dst.octets());
        let net_id = self.v6.net_join.get(src_id, dst_id);
        let result_id = self.v6.result_join.get(net_id, transport_id);
        self.v6.result_registry.get(result_id)
    }
}

/// Stateless compiler entry point (spec.md §4.4).
pub struct AclCompiler;

impl AclCompiler {
    pub fn compile(rules: Vec<AclRule>) -> Result<CompiledAcl> {
        for rule in &rules {
            if let (Some(src), Some(dst)) = (&rule.src_net, &rule.dst_net) {
                let src_is_v4 = matches!(src, IpNet::V4(_));
                let dst_is_v4 = matches!(dst, IpNet::V4(_));
                if src_is_v4 != dst_is_v4 {
                    return Err(FwdpError::InvalidArgument("rule mixes IPv4 and IPv6 net predicates".into()));
                }
            }
        }

        let n = rules.len();
        let (src_port_ids, src_port_bitsets) = build_port_dimension(&rules, n, |r| r.src_port);
        let (dst_port_ids, dst_port_bitsets) = build_port_dimension(&rules, n, |r| r.dst_port);
        let (port_join, port_bitsets) = join_dense(&src_port_bitsets, &dst_port_bitsets);

        let (proto_ids, proto_bitsets) = build_proto_dimension(&rules, n);
        let (transport_join, transport_bitsets) = join_dense(&port_bitsets, &proto_bitsets);

        let v4 = build_family(&rules, 4, &transport_bitsets);
        let v6 = build_family(&rules, 16, &transport_bitsets);

        Ok(CompiledAcl { src_port_ids, dst_port_ids, port_join, proto_ids, transport_join, v4, v6 })
    }
}
