//! Packet batch data model — `packet_front` and packet descriptors
//! (spec.md §3 "Packet batch (`packet_front`)").
//!
//! The original is four singly-linked intrusive lists sharing one pool of
//! descriptors so a descriptor can move between lists without copying.
//! In safe Rust, a `VecDeque` per queue gives the same "belongs to
//! exactly one list" invariant for free: moving a descriptor from
//! `input` to `output` is an actual move, so the type system (not a
//! runtime assertion) rules out a descriptor being reachable from two
//! queues at once.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Preallocated frame buffer capacity ceiling (spec.md §3 "a preallocated
/// frame buffer of capacity <= `MBUF_MAX_SIZE`"). 9216 covers jumbo
/// frames; picked here since spec.md leaves the exact figure
/// unspecified (recorded as an Open Question resolution in DESIGN.md).
pub const MBUF_MAX_SIZE: usize = 9216;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Ipv6,
    Other(u16),
}

impl EtherType {
    pub fn from_u16(raw: u16) -> Self {
        match raw {
            0x0800 => EtherType::Ipv4,
            0x86DD => EtherType::Ipv6,
            other => EtherType::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportProto {
    Tcp,
    Udp,
    Other(u8),
}

impl TransportProto {
    pub fn from_ip_proto(raw: u8) -> Self {
        match raw {
            6 => TransportProto::Tcp,
            17 => TransportProto::Udp,
            other => TransportProto::Other(other),
        }
    }

    pub fn ip_proto_number(&self) -> u8 {
        match self {
            TransportProto::Tcp => 6,
            TransportProto::Udp => 17,
            TransportProto::Other(n) => *n,
        }
    }
}

/// A preallocated frame buffer (spec.md §3 "mbuf").
#[derive(Debug, Clone)]
pub struct Mbuf {
    data: Vec<u8>,
}

impl Mbuf {
    pub fn new(data: Vec<u8>) -> crate::error::Result<Self> {
        if data.len() > MBUF_MAX_SIZE {
            return Err(crate::error::FwdpError::InvalidArgument(format!(
                "frame of {} bytes exceeds MBUF_MAX_SIZE {MBUF_MAX_SIZE}",
                data.len()
            )));
        }
        Ok(Self { data })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Parsed offsets and protocol fields the NIC collaborator delivers with
/// every frame (spec.md §1 "assume a function delivering a batch of
/// contiguous frames with parsed L2/L3/L4 header offsets").
#[derive(Debug, Clone, Copy)]
pub struct ParsedHeaders {
    pub l2_offset: usize,
    pub l3_offset: usize,
    pub l4_offset: usize,
    pub ethertype: EtherType,
    pub transport: TransportProto,
}

/// One packet in a batch. Invariant: reachable from exactly one of
/// `PacketFront`'s four queues at any time (spec.md §3).
#[derive(Debug, Clone)]
pub struct PacketDescriptor {
    pub headers: ParsedHeaders,
    pub mbuf: Mbuf,
    pub input_device: u16,
    pub output_device: Option<u16>,
}

/// Minimal IPv4/TCP/UDP field view used by the ACL and fwstate handlers.
/// Non-goals per spec.md §1: no reassembly, no parsing beyond IPv4/IPv6 +
/// TCP/UDP headers at known offsets.
#[derive(Debug, Clone, Copy)]
pub struct L3L4Fields {
    pub proto: u8,
    pub src_v4: Ipv4Addr,
    pub dst_v4: Ipv4Addr,
    pub src_v6: Ipv6Addr,
    pub dst_v6: Ipv6Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub tcp_flags: u8,
}

impl PacketDescriptor {
    /// Parse the fields the classifier and fwstate handler need,
    /// directly from the underlying mbuf at the offsets the NIC
    /// collaborator already located.
    pub fn fields(&self) -> crate::error::Result<L3L4Fields> {
        let bytes = self.mbuf.as_bytes();
        let l3 = self.headers.l3_offset;
        let l4 = self.headers.l4_offset;

        let (proto, src_v4, dst_v4, src_v6, dst_v6) = match self.headers.ethertype {
            EtherType::Ipv4 => {
                require_len(bytes, l3 + 20)?;
                let proto = bytes[l3 + 9];
                let src = Ipv4Addr::new(bytes[l3 + 12], bytes[l3 + 13], bytes[l3 + 14], bytes[l3 + 15]);
                let dst = Ipv4Addr::new(bytes[l3 + 16], bytes[l3 + 17], bytes[l3 + 18], bytes[l3 + 19]);
                (proto, src, dst, Ipv6Addr::UNSPECIFIED, Ipv6Addr::UNSPECIFIED)
            }
            EtherType::Ipv6 => {
                require_len(bytes, l3 + 40)?;
                let proto = bytes[l3 + 6];
                let mut src = [0u8; 16];
                src.copy_from_slice(&bytes[l3 + 8..l3 + 24]);
                let mut dst = [0u8; 16];
                dst.copy_from_slice(&bytes[l3 + 24..l3 + 40]);
                (proto, Ipv4Addr::UNSPECIFIED, Ipv4Addr::UNSPECIFIED, Ipv6Addr::from(src), Ipv6Addr::from(dst))
            }
            EtherType::Other(_) => {
                return Err(crate::error::FwdpError::InvalidArgument("non-IP ethertype has no L3 fields".into()))
            }
        };

        let (src_port, dst_port, tcp_flags) = match self.headers.transport {
            TransportProto::Tcp => {
                require_len(bytes, l4 + 14)?;
                let src_port = u16::from_be_bytes([bytes[l4], bytes[l4 + 1]]);
                let dst_port = u16::from_be_bytes([bytes[l4 + 2], bytes[l4 + 3]]);
                let raw_flags = bytes[l4 + 13];
                (src_port, dst_port, crate::fwstate::key::fold_tcp_flags(raw_flags))
            }
            TransportProto::Udp => {
                require_len(bytes, l4 + 4)?;
                let src_port = u16::from_be_bytes([bytes[l4], bytes[l4 + 1]]);
                let dst_port = u16::from_be_bytes([bytes[l4 + 2], bytes[l4 + 3]]);
                (src_port, dst_port, 0)
            }
            TransportProto::Other(_) => (0, 0, 0),
        };

        Ok(L3L4Fields { proto, src_v4, dst_v4, src_v6, dst_v6, src_port, dst_port, tcp_flags })
    }
}

fn require_len(bytes: &[u8], min_len: usize) -> crate::error::Result<()> {
    if bytes.len() < min_len {
        Err(crate::error::FwdpError::InvalidArgument(format!("frame too short: need {min_len}, have {}", bytes.len())))
    } else {
        Ok(())
    }
}

/// The four queues a worker's in-flight batch is partitioned across
/// (spec.md §3).
#[derive(Debug, Default)]
pub struct PacketFront {
    pub input: VecDeque<PacketDescriptor>,
    pub output: VecDeque<PacketDescriptor>,
    pub drop: VecDeque<PacketDescriptor>,
    pub bypass: VecDeque<PacketDescriptor>,
}

impl PacketFront {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_input(&mut self, descriptor: PacketDescriptor) {
        self.input.push_back(descriptor);
    }

    pub fn pop_input(&mut self) -> Option<PacketDescriptor> {
        self.input.pop_front()
    }

    pub fn to_output(&mut self, descriptor: PacketDescriptor) {
        self.output.push_back(descriptor);
    }

    pub fn to_drop(&mut self, descriptor: PacketDescriptor) {
        self.drop.push_back(descriptor);
    }

    pub fn to_bypass(&mut self, descriptor: PacketDescriptor) {
        self.bypass.push_back(descriptor);
    }

    /// Rotate for the next stage: `output` of stage N becomes `input` of
    /// stage N+1 (spec.md §4.10). `input` must already be fully drained —
    /// a handler must drain it completely before returning.
    pub fn rotate(&mut self) {
        debug_assert!(self.input.is_empty(), "handler must fully drain input before rotate");
        std::mem::swap(&mut self.input, &mut self.output);
    }
}
