//! State keys and values (spec.md §3 "fw4/6 state key", "fw_state_value").
//!
//! Keys are canonicalized to the forward orientation at creation time; a
//! lookup for return traffic swaps src/dst before probing (spec.md §4.8,
//! `original_source/lib/fwstate/lookup.c: fwstate_build_state_key_v4/v6`).

use super::map::{MapKey, MergeValue};
use std::net::{Ipv4Addr, Ipv6Addr};

/// TCP flag bits as retained by fwstate: only FIN/SYN/RST/ACK survive,
/// folded from the raw TCP header flags
/// (`original_source/lib/fwstate/types.h: fwstate_flags_from_tcp`).
pub const FWSTATE_FIN: u8 = 0x01;
pub const FWSTATE_SYN: u8 = 0x02;
pub const FWSTATE_RST: u8 = 0x04;
pub const FWSTATE_ACK: u8 = 0x08;

/// Fold raw TCP header flags into the four bits fwstate tracks: FIN, SYN,
/// RST keep their wire bit positions; PSH is discarded; the wire ACK bit
/// (`0x10`) is the one that maps down into `FWSTATE_ACK` (`0x08`).
/// `(raw & 0x07) | ((raw >> 1) & ACK)`.
pub fn fold_tcp_flags(raw: u8) -> u8 {
    (raw & 0x07) | ((raw >> 1) & FWSTATE_ACK)
}

/// IPv4 5-tuple key, 16 bytes, 8-byte aligned (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Fw4Key {
    pub proto: u16,
    pub src_port: u16,
    pub dst_port: u16,
    pub pad: u16,
    pub src_addr: u32, // big-endian network order
    pub dst_addr: u32,
}

impl Fw4Key {
    pub fn new(proto: u8, src_addr: Ipv4Addr, src_port: u16, dst_addr: Ipv4Addr, dst_port: u16) -> Self {
        Self {
            proto: proto as u16,
            src_port,
            dst_port,
            pad: 0,
            src_addr: u32::from_be_bytes(src_addr.octets()),
            dst_addr: u32::from_be_bytes(dst_addr.octets()),
        }
    }

    /// Build the reverse-direction key used to probe state for a return
    /// packet: src/dst addresses and ports swapped.
    pub fn reversed(&self) -> Self {
        Self {
            proto: self.proto,
            src_port: self.dst_port,
            dst_port: self.src_port,
            pad: 0,
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
        }
    }

    pub fn as_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0..2].copy_from_slice(&self.proto.to_ne_bytes());
        out[2..4].copy_from_slice(&self.src_port.to_ne_bytes());
        out[4..6].copy_from_slice(&self.dst_port.to_ne_bytes());
        out[6..8].copy_from_slice(&self.pad.to_ne_bytes());
        out[8..12].copy_from_slice(&self.src_addr.to_ne_bytes());
        out[12..16].copy_from_slice(&self.dst_addr.to_ne_bytes());
        out
    }
}

/// IPv6 5-tuple key, 40 bytes, 8-byte aligned (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Fw6Key {
    pub proto: u16,
    pub src_port: u16,
    pub dst_port: u16,
    pub pad: u16,
    pub src_addr: [u8; 16],
    pub dst_addr: [u8; 16],
}

impl Fw6Key {
    pub fn new(proto: u8, src_addr: Ipv6Addr, src_port: u16, dst_addr: Ipv6Addr, dst_port: u16) -> Self {
        Self {
            proto: proto as u16,
            src_port,
            dst_port,
            pad: 0,
            src_addr: src_addr.octets(),
            dst_addr: dst_addr.octets(),
        }
    }

    pub fn reversed(&self) -> Self {
        Self {
            proto: self.proto,
            src_port: self.dst_port,
            dst_port: self.src_port,
            pad: 0,
            src_addr: self.dst_addr,
            dst_addr: self.src_addr,
        }
    }

    pub fn as_bytes(&self) -> [u8; 40] {
        let mut out = [0u8; 40];
        out[0..2].copy_from_slice(&self.proto.to_ne_bytes());
        out[2..4].copy_from_slice(&self.src_port.to_ne_bytes());
        out[4..6].copy_from_slice(&self.dst_port.to_ne_bytes());
        out[6..8].copy_from_slice(&self.pad.to_ne_bytes());
        out[8..24].copy_from_slice(&self.src_addr);
        out[24..40].copy_from_slice(&self.dst_addr);
        out
    }
}

impl MapKey for Fw4Key {
    fn hash_input(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

impl MapKey for Fw6Key {
    fn hash_input(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// A key that is either the v4 or v6 variant, for code that is generic
/// over address family (the layer map and fwmap are instantiated
/// separately per family, but the sync handler dispatches on a single
/// enum).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FwKey {
    V4(Fw4Key),
    V6(Fw6Key),
}

impl FwKey {
    pub fn reversed(&self) -> Self {
        match self {
            FwKey::V4(k) => FwKey::V4(k.reversed()),
            FwKey::V6(k) => FwKey::V6(k.reversed()),
        }
    }
}

/// `fw_state_value` (spec.md §3). `flags` is a monotonic bit-union across
/// merges; `packets_forward`/`packets_backward` are updated via relaxed
/// atomic add in the live map, but the value handed around between calls
/// is a plain snapshot struct — atomicity happens at the slot, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FwStateValue {
    pub external: bool,
    pub proto_type: u8,
    pub flags: u8,
    pub packets_forward: u64,
    pub packets_backward: u64,
    pub packets_since_last_sync: u32,
    pub last_sync: u64,
}

impl FwStateValue {
    pub fn new_forward(proto_type: u8, flags: u8, now: u64) -> Self {
        Self {
            external: false,
            proto_type,
            flags,
            packets_forward: 1,
            packets_backward: 0,
            packets_since_last_sync: 0,
            last_sync: now,
        }
    }

    /// `fwmap_merge_value_fwstate`: scalar fields take the new value,
    /// `flags` bit-unions, packet counters add.
    pub fn merge(&self, new: &FwStateValue) -> FwStateValue {
        FwStateValue {
            external: new.external,
            proto_type: new.proto_type,
            flags: self.flags | new.flags,
            packets_forward: self.packets_forward + new.packets_forward,
            packets_backward: self.packets_backward + new.packets_backward,
            packets_since_last_sync: new.packets_since_last_sync,
            last_sync: new.last_sync,
        }
    }
}

impl MergeValue for FwStateValue {
    fn merge(&self, new: &Self) -> Self {
        FwStateValue::merge(self, new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_flag_fold_drops_psh_and_maps_wire_ack_down() {
        // SYN(0x02) | ACK(0x10) on the wire folds to FWSTATE_SYN | FWSTATE_ACK.
        assert_eq!(fold_tcp_flags(0x02 | 0x10), FWSTATE_SYN | FWSTATE_ACK);
        // FIN(0x01) | RST(0x04) | PSH(0x08) on the wire folds to FIN|RST; PSH is dropped.
        assert_eq!(fold_tcp_flags(0x01 | 0x04 | 0x08), FWSTATE_FIN | FWSTATE_RST);
    }

    #[test]
    fn reversed_key_swaps_src_dst() {
        let k = Fw4Key::new(6, Ipv4Addr::new(10, 0, 0, 1), 1000, Ipv4Addr::new(10, 0, 0, 2), 80);
        let r = k.reversed();
        assert_eq!(r.src_addr, k.dst_addr);
        assert_eq!(r.dst_addr, k.src_addr);
        assert_eq!(r.src_port, k.dst_port);
        assert_eq!(r.dst_port, k.src_port);
        assert_eq!(r.reversed(), k);
    }

    #[test]
    fn merge_is_commutative_on_flags_and_additive_on_counters() {
        let a = FwStateValue { flags: FWSTATE_SYN, packets_forward: 2, packets_backward: 0, ..zero() };
        let b = FwStateValue { flags: FWSTATE_ACK, packets_forward: 1, packets_backward: 3, ..zero() };
        assert_eq!(a.merge(&b).flags, b.merge(&a).flags);
        assert_eq!(a.merge(&b).packets_forward, 3);
        assert_eq!(a.merge(&b).packets_backward, 3);
    }

    fn zero() -> FwStateValue {
        FwStateValue {
            external: false,
            proto_type: 6,
            flags: 0,
            packets_forward: 0,
            packets_backward: 0,
            packets_since_last_sync: 0,
            last_sync: 0,
        }
    }
}
