//! End-to-end pipeline test: an ACL with a `keep_state` pass rule
//! followed by a `check_state` rule, wired through the `fwstate` module
//! exactly as a configured pipeline would (spec.md §4.8 "ordinary
//! traffic lookup").

use fwdp_lib::acl::{AclCompiler, AclHandler, AclRule, ActionKind, PortRange, StateChecker, ACL_RULE_KEEP_STATE_FLAG};
use fwdp_lib::clock::SystemClock;
use fwdp_lib::fwstate::{FwState, HashKind, Timeouts};
use fwdp_lib::pipeline::{EtherType, Mbuf, PacketDescriptor, PacketFront, ParsedHeaders, Pipeline, PipelineFunction, TransportProto};
use std::sync::Arc;

fn tcp_descriptor(src: [u8; 4], sport: u16, dst: [u8; 4], dport: u16, flags: u8, device: u16) -> PacketDescriptor {
    let mut frame = vec![0u8; 54];
    frame[14 + 9] = 6;
    frame[14 + 12..14 + 16].copy_from_slice(&src);
    frame[14 + 16..14 + 20].copy_from_slice(&dst);
    frame[34..36].copy_from_slice(&sport.to_be_bytes());
    frame[36..38].copy_from_slice(&dport.to_be_bytes());
    frame[34 + 13] = flags;
    PacketDescriptor {
        headers: ParsedHeaders { l2_offset: 0, l3_offset: 14, l4_offset: 34, ethertype: EtherType::Ipv4, transport: TransportProto::Tcp },
        mbuf: Mbuf::new(frame).unwrap(),
        input_device: device,
        output_device: None,
    }
}

#[test]
fn syn_establishes_state_then_reply_passes_via_check_state() {
    let fwstate = Arc::new(FwState::new("fwstate0", 64, 2, HashKind::Fnv1a, 0, 0, Timeouts::default(), None).unwrap());

    let rules = vec![
        // Outbound SYN to port 22 installs state.
        AclRule {
            devices: 0xFFFF,
            src_net: None,
            dst_net: None,
            proto: Some(6),
            tcp_flags: None,
            src_port: None,
            dst_port: Some(PortRange(22, 22)),
            action_kind: ActionKind::Pass,
            non_terminate: false,
            action_flags: ACL_RULE_KEEP_STATE_FLAG,
        },
        // Everything else only passes if it matches existing state.
        AclRule {
            devices: 0xFFFF,
            src_net: None,
            dst_net: None,
            proto: None,
            tcp_flags: None,
            src_port: None,
            dst_port: None,
            action_kind: ActionKind::CheckState,
            non_terminate: false,
            action_flags: 0,
        },
    ];
    let compiled = AclCompiler::compile(rules).unwrap();
    let acl = Arc::new(AclHandler::new("acl0", compiled).with_state_checker(fwstate.clone() as Arc<dyn StateChecker>));

    let pipeline = Pipeline::new("p0", vec![PipelineFunction::single_chain("f0", vec![acl])]);
    let clock = SystemClock::new();

    let mut front = PacketFront::new();
    front.push_input(tcp_descriptor([10, 0, 0, 1], 4000, [10, 0, 0, 2], 22, 0x02, 0));
    let outcome = pipeline.run(front, 0, &clock, fwdp_lib::logging::DpLogger::new("test")).unwrap();
    assert_eq!(outcome.transmit.len(), 1, "first SYN passes and installs state");

    let mut front = PacketFront::new();
    front.push_input(tcp_descriptor([10, 0, 0, 2], 22, [10, 0, 0, 1], 4000, 0x10, 0));
    let outcome = pipeline.run(front, 0, &clock, fwdp_lib::logging::DpLogger::new("test")).unwrap();
    assert_eq!(outcome.transmit.len(), 1, "reply matches state in reverse direction");
    assert!(outcome.dropped.is_empty());
}

#[test]
fn traffic_with_no_rule_match_and_no_state_is_dropped() {
    let fwstate = Arc::new(FwState::new("fwstate0", 64, 2, HashKind::Fnv1a, 0, 0, Timeouts::default(), None).unwrap());
    let rules = vec![AclRule {
        devices: 0xFFFF,
        src_net: None,
        dst_net: None,
        proto: None,
        tcp_flags: None,
        src_port: None,
        dst_port: None,
        action_kind: ActionKind::CheckState,
        non_terminate: false,
        action_flags: 0,
    }];
    let compiled = AclCompiler::compile(rules).unwrap();
    let acl = Arc::new(AclHandler::new("acl0", compiled).with_state_checker(fwstate as Arc<dyn StateChecker>));
    let pipeline = Pipeline::new("p0", vec![PipelineFunction::single_chain("f0", vec![acl])]);
    let clock = SystemClock::new();

    let mut front = PacketFront::new();
    front.push_input(tcp_descriptor([192, 168, 1, 1], 5000, [8, 8, 8, 8], 443, 0x02, 0));
    let outcome = pipeline.run(front, 0, &clock, fwdp_lib::logging::DpLogger::new("test")).unwrap();
    assert!(outcome.transmit.is_empty());
    assert_eq!(outcome.dropped.len(), 1);
}
