//! Sync wire frame and transport (spec.md §3 "Sync frame (wire)", §6
//! "Sync wire format").
//!
//! `SyncFrame` is the 56-byte `fw_state_sync_frame` record. All fields
//! are little-endian on the wire except the two raw IPv6 address byte
//! arrays, which carry network-byte-order address bytes directly (spec.md
//! §3, §6). `SyncSocket` is the UDP-over-IPv6-multicast transport that
//! carries batches of these frames between peers, built on `socket2` the
//! way the teacher crate's proxy layer reaches for `socket2` for raw
//! socket option control.

use crate::error::{FwdpError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

pub const SYNC_FRAME_LEN: usize = 56;
pub const ADDR_TYPE_IP4: u8 = 4;
pub const ADDR_TYPE_IP6: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncFrame {
    pub dst_ip: u32,
    pub src_ip: u32,
    pub dst_port: u16,
    pub src_port: u16,
    pub fib: u8,
    pub proto: u8,
    pub flags: u8,
    pub addr_type: u8,
    pub dst_ip6: [u8; 16],
    pub src_ip6: [u8; 16],
    pub flow_id6: u32,
    pub extra: u32,
}

impl SyncFrame {
    pub fn encode(&self, out: &mut BytesMut) {
        out.put_u32_le(self.dst_ip);
        out.put_u32_le(self.src_ip);
        out.put_u16_le(self.dst_port);
        out.put_u16_le(self.src_port);
        out.put_u8(self.fib);
        out.put_u8(self.proto);
        out.put_u8(self.flags);
        out.put_u8(self.addr_type);
        out.put_slice(&self.dst_ip6);
        out.put_slice(&self.src_ip6);
        out.put_u32_le(self.flow_id6);
        out.put_u32_le(self.extra);
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SYNC_FRAME_LEN {
            return Err(FwdpError::WireFormat(format!("sync frame too short: {} bytes", bytes.len())));
        }
        let dst_ip = bytes.get_u32_le();
        let src_ip = bytes.get_u32_le();
        let dst_port = bytes.get_u16_le();
        let src_port = bytes.get_u16_le();
        let fib = bytes.get_u8();
        let proto = bytes.get_u8();
        let flags = bytes.get_u8();
        let addr_type = bytes.get_u8();
        let mut dst_ip6 = [0u8; 16];
        bytes.copy_to_slice(&mut dst_ip6);
        let mut src_ip6 = [0u8; 16];
        bytes.copy_to_slice(&mut src_ip6);
        let flow_id6 = bytes.get_u32_le();
        let extra = bytes.get_u32_le();
        Ok(Self { dst_ip, src_ip, dst_port, src_port, fib, proto, flags, addr_type, dst_ip6, src_ip6, flow_id6, extra })
    }

    /// "external" iff this frame arrived from a peer rather than being
    /// created locally — decided from the enclosing packet's IPv6
    /// source address being non-zero, not any field of the frame itself
    /// (spec.md §4.8; `original_source/modules/fwstate/dataplane/dataplane.c`
    /// compares the IPv6 header's source address, not the frame).
    /// `is_external_source` is the helper for that outer check.
    pub fn is_external_source(ipv6_src: &Ipv6Addr) -> bool {
        !ipv6_src.is_unspecified()
    }
}

/// Encode a batch of frames into one UDP payload.
pub fn encode_frames(frames: &[SyncFrame]) -> Bytes {
    let mut out = BytesMut::with_capacity(frames.len() * SYNC_FRAME_LEN);
    for frame in frames {
        frame.encode(&mut out);
    }
    out.freeze()
}

/// Decode a UDP payload into its constituent frames. The caller has
/// already validated non-zero-multiple-of-56 shape per spec.md §4.8's
/// `is_fw_state_sync_packet` check; this additionally re-validates so it
/// can be used standalone (e.g. from tests or the CLI).
pub fn decode_frames(payload: &[u8]) -> Result<Vec<SyncFrame>> {
    if payload.is_empty() || payload.len() % SYNC_FRAME_LEN != 0 {
        return Err(FwdpError::WireFormat(format!(
            "sync payload length {} is not a non-zero multiple of {SYNC_FRAME_LEN}",
            payload.len()
        )));
    }
    payload.chunks_exact(SYNC_FRAME_LEN).map(SyncFrame::decode).collect()
}

/// Configuration for the multicast transport (spec.md §6 "Sync wire
/// format"): destination multicast address/port, and this node's own
/// source address used when rewriting internally-originated frames
/// before re-emission (spec.md §4.8 "internal sync packets ... are
/// rewritten (source address set, UDP checksum recomputed)").
#[derive(Debug, Clone, Copy)]
pub struct SyncTransportConfig {
    pub multicast_addr: Ipv6Addr,
    pub port: u16,
    pub local_addr: Ipv6Addr,
    pub interface_index: u32,
}

/// UDP-over-IPv6-multicast socket carrying batches of [`SyncFrame`]s to
/// and from peers.
pub struct SyncSocket {
    socket: Socket,
    config: SyncTransportConfig,
}

impl SyncSocket {
    pub fn bind(config: SyncTransportConfig) -> Result<Self> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_multicast_loop_v6(false)?;
        let bind_addr: SocketAddr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, config.port, 0, 0).into();
        socket.bind(&SockAddr::from(bind_addr))?;
        socket.join_multicast_v6(&config.multicast_addr, config.interface_index)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket, config })
    }

    /// Emit a batch of frames to the configured multicast group.
    pub fn send_frames(&self, frames: &[SyncFrame]) -> Result<usize> {
        let payload = encode_frames(frames);
        let dest: SocketAddr = SocketAddrV6::new(self.config.multicast_addr, self.config.port, 0, 0).into();
        Ok(self.socket.send_to(&payload, &SockAddr::from(dest))?)
    }

    /// Receive one datagram (up to `max_len` bytes) and decode it into
    /// frames, plus the sender's IPv6 address (used by the handler to
    /// classify internal/external).
    pub fn recv_frames(&self, max_len: usize) -> Result<(Vec<SyncFrame>, Ipv6Addr)> {
        let mut buf = vec![std::mem::MaybeUninit::new(0u8); max_len];
        let (len, from) = self.socket.recv_from(&mut buf)?;
        let sender_v6 = match from.as_socket_ipv6() {
            Some(v6) => *v6.ip(),
            None => return Err(FwdpError::WireFormat("sync datagram from non-IPv6 peer".into())),
        };
        let received: Vec<u8> = buf[..len].iter().map(|b| unsafe { b.assume_init() }).collect();
        let frames = decode_frames(&received)?;
        Ok((frames, sender_v6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn sample_v4_frame() -> SyncFrame {
        // S2: locally-created UDP state 192.0.2.1:53 -> 198.51.100.1:33333
        SyncFrame {
            dst_ip: u32::from_be_bytes(Ipv4Addr::new(198, 51, 100, 1).octets()),
            src_ip: u32::from_be_bytes(Ipv4Addr::new(192, 0, 2, 1).octets()),
            dst_port: 33333,
            src_port: 53,
            fib: 0,
            proto: 17,
            flags: 0,
            addr_type: ADDR_TYPE_IP4,
            dst_ip6: [0; 16],
            src_ip6: [0; 16],
            flow_id6: 0,
            extra: 0,
        }
    }

    #[test]
    fn encodes_expected_56_byte_s2_vector() {
        let frame = sample_v4_frame();
        assert_eq!(frame.src_ip, 0xC000_0201);
        assert_eq!(frame.dst_ip, 0xC633_6401);

        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        assert_eq!(buf.len(), SYNC_FRAME_LEN);
        assert_eq!(buf[0..4], frame.dst_ip.to_le_bytes());
        assert_eq!(buf[4..8], frame.src_ip.to_le_bytes());
        assert_eq!(buf[15], ADDR_TYPE_IP4);
    }

    #[test]
    fn round_trips_modulo_counters() {
        // Testable property 3: encode -> decode -> re-encode is stable.
        let frame = sample_v4_frame();
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        let decoded = SyncFrame::decode(&buf).unwrap();
        assert_eq!(decoded, frame);

        let mut buf2 = BytesMut::new();
        decoded.encode(&mut buf2);
        assert_eq!(buf, buf2);
    }

    #[test]
    fn decode_frames_rejects_non_multiple_length() {
        let bytes = vec![0u8; SYNC_FRAME_LEN + 1];
        assert!(decode_frames(&bytes).is_err());
    }

    #[test]
    fn decode_frames_rejects_empty_payload() {
        assert!(decode_frames(&[]).is_err());
    }

    #[test]
    fn batch_of_frames_round_trips() {
        let frames = vec![sample_v4_frame(), sample_v4_frame()];
        let payload = encode_frames(&frames);
        let decoded = decode_frames(&payload).unwrap();
        assert_eq!(decoded, frames);
    }

    #[test]
    fn external_source_detection_matches_nonzero_ipv6_src() {
        assert!(!SyncFrame::is_external_source(&Ipv6Addr::UNSPECIFIED));
        assert!(SyncFrame::is_external_source(&Ipv6Addr::LOCALHOST));
    }
}
