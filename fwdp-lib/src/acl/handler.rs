//! ACL pipeline module (spec.md §4.5 "Per-packet evaluation").
//!
//! Actions are evaluated in declaration order; the first terminating
//! action (`pass` or `deny` without `non_terminate`, or a `check_state`
//! hit) decides the packet. A `check_state` miss falls through to the
//! next action rather than deciding anything, and a result list with no
//! terminating action at all is a drop — there is no implicit default
//! rule.

use super::action::{unpack_action, ActionKind, ACL_RULE_KEEP_STATE_FLAG};
use super::compiler::CompiledAcl;
use crate::error::Result;
use crate::pipeline::{EtherType, HandlerContext, L3L4Fields, ModuleKind, PacketFront, PipelineModule};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Decouples the ACL module from any concrete state-table
/// implementation, the same way [`PipelineModule`] decouples the
/// pipeline runtime from concrete stage implementations — the ACL
/// compiler/handler must not depend on `fwstate` directly.
pub trait StateChecker: Send + Sync {
    /// Returns `true` if this packet has a live, matching fwstate entry
    /// (spec.md §4.8 "ordinary traffic lookup").
    fn check_state(&self, ctx: &HandlerContext<'_>, ethertype: EtherType, fields: &L3L4Fields) -> bool;

    /// Called when a terminating `pass` action carries
    /// [`ACL_RULE_KEEP_STATE_FLAG`]: install state for this flow so
    /// return traffic resolves via `check_state` instead of re-running
    /// the full ACL (spec.md §4.8). No-op by default for state checkers
    /// that never install state.
    fn create_state(&self, _ctx: &HandlerContext<'_>, _ethertype: EtherType, _fields: &L3L4Fields) {}
}

/// Per-packet verdict; kept as a named type rather than a bare `bool` so
/// call sites read as classifier output, not an arbitrary flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AclOutcome {
    pub pass: bool,
}

fn device_bit(device: u16) -> u16 {
    if device >= 16 {
        0
    } else {
        1u16 << device
    }
}

/// A compiled ACL installed as a pipeline stage. The compiled table is
/// published behind an [`ArcSwap`] so a control-plane recompile
/// ([`AclHandler::publish`]) takes effect for the next batch without a
/// worker ever observing a half-updated table.
pub struct AclHandler {
    name: String,
    compiled: ArcSwap<CompiledAcl>,
    state_checker: Option<Arc<dyn StateChecker>>,
}

impl AclHandler {
    pub fn new(name: impl Into<String>, compiled: CompiledAcl) -> Self {
        Self { name: name.into(), compiled: ArcSwap::new(Arc::new(compiled)), state_checker: None }
    }

    pub fn with_state_checker(mut self, checker: Arc<dyn StateChecker>) -> Self {
        self.state_checker = Some(checker);
        self
    }

    /// Atomically swap in a freshly compiled rule set (control-plane
    /// path; spec.md §4.4 describes compilation as happening offline
    /// from the hot path).
    pub fn publish(&self, compiled: CompiledAcl) {
        self.compiled.store(Arc::new(compiled));
    }

    fn classify<'a>(compiled: &'a CompiledAcl, ethertype: EtherType, fields: &L3L4Fields) -> &'a [u32] {
        match ethertype {
            EtherType::Ipv4 => compiled.classify_v4(fields.src_v4, fields.dst_v4, fields.src_port, fields.dst_port, fields.proto, fields.tcp_flags),
            EtherType::Ipv6 => compiled.classify_v6(fields.src_v6, fields.dst_v6, fields.src_port, fields.dst_port, fields.proto, fields.tcp_flags),
            EtherType::Other(_) => &[],
        }
    }

    fn evaluate(&self, ctx: &HandlerContext<'_>, input_device: u16, ethertype: EtherType, fields: &L3L4Fields) -> AclOutcome {
        let compiled = self.compiled.load();
        let actions = Self::classify(&compiled, ethertype, fields);
        let device_bit = device_bit(input_device);

        for &word in actions {
            let unpacked = unpack_action(word);
            if unpacked.category_mask & device_bit == 0 {
                continue;
            }
            let terminal = !unpacked.non_terminate;
            match unpacked.kind {
                ActionKind::Pass => {
                    if unpacked.flags & ACL_RULE_KEEP_STATE_FLAG != 0 {
                        if let Some(checker) = &self.state_checker {
                            checker.create_state(ctx, ethertype, fields);
                        }
                    }
                    if terminal {
                        return AclOutcome { pass: true };
                    }
                }
                ActionKind::Deny => {
                    if terminal {
                        return AclOutcome { pass: false };
                    }
                }
                ActionKind::Count => {}
                ActionKind::CheckState => {
                    let hit = self.state_checker.as_ref().is_some_and(|checker| checker.check_state(ctx, ethertype, fields));
                    if hit {
                        return AclOutcome { pass: true };
                    }
                }
            }
        }
        AclOutcome { pass: false }
    }
}

impl PipelineModule for AclHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Acl
    }

    fn handle(&self, front: &mut PacketFront, ctx: &HandlerContext<'_>) -> Result<()> {
        while let Some(descriptor) = front.pop_input() {
            let ethertype = descriptor.headers.ethertype;
            let input_device = descriptor.input_device;
            let outcome = match descriptor.fields() {
                Ok(fields) => self.evaluate(ctx, input_device, ethertype, &fields),
                Err(_) => AclOutcome { pass: false },
            };
            if outcome.pass {
                front.to_output(descriptor);
            } else {
                front.to_drop(descriptor);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acl::compiler::{AclCompiler, AclRule, PortRange};
    use crate::clock::SystemClock;
    use crate::logging::DpLogger;
    use crate::pipeline::{EtherType, Mbuf, PacketDescriptor, ParsedHeaders, TransportProto};

    struct AlwaysHit;
    impl StateChecker for AlwaysHit {
        fn check_state(&self, _ctx: &HandlerContext<'_>, _ethertype: EtherType, _fields: &L3L4Fields) -> bool {
            true
        }
    }

    struct NeverHit;
    impl StateChecker for NeverHit {
        fn check_state(&self, _ctx: &HandlerContext<'_>, _ethertype: EtherType, _fields: &L3L4Fields) -> bool {
            false
        }
    }

    fn ctx(clock: &SystemClock) -> HandlerContext<'_> {
        HandlerContext { worker_idx: 0, now: 0, logger: DpLogger::new("test"), clock }
    }

    fn tcp_syn_descriptor(dport: u16) -> PacketDescriptor {
        let mut frame = vec![0u8; 54];
        frame[14 + 9] = 6;
        frame[14 + 12..14 + 16].copy_from_slice(&[10, 0, 0, 1]);
        frame[14 + 16..14 + 20].copy_from_slice(&[10, 0, 0, 2]);
        frame[34..36].copy_from_slice(&4000u16.to_be_bytes());
        frame[36..38].copy_from_slice(&dport.to_be_bytes());
        frame[34 + 13] = 0x02;
        PacketDescriptor {
            headers: ParsedHeaders { l2_offset: 0, l3_offset: 14, l4_offset: 34, ethertype: EtherType::Ipv4, transport: TransportProto::Tcp },
            mbuf: Mbuf::new(frame).unwrap(),
            input_device: 0,
            output_device: None,
        }
    }

    fn rule(kind: ActionKind, dst_port: Option<(u16, u16)>) -> AclRule {
        AclRule {
            devices: 0xFFFF,
            src_net: None,
            dst_net: None,
            proto: Some(6),
            tcp_flags: None,
            src_port: None,
            dst_port: dst_port.map(|(a, b)| PortRange(a, b)),
            action_kind: kind,
            non_terminate: false,
            action_flags: 0,
        }
    }

    #[test]
    fn pass_rule_terminates_with_pass() {
        let clock = SystemClock::new();
        let acl = AclCompiler::compile(vec![rule(ActionKind::Pass, Some((22, 22)))]).unwrap();
        let handler = AclHandler::new("acl0", acl);
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(22));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert_eq!(front.output.len(), 1);
        assert!(front.drop.is_empty());
    }

    #[test]
    fn no_matching_rule_drops() {
        let clock = SystemClock::new();
        let acl = AclCompiler::compile(vec![rule(ActionKind::Pass, Some((22, 22)))]).unwrap();
        let handler = AclHandler::new("acl0", acl);
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(80));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert!(front.output.is_empty());
        assert_eq!(front.drop.len(), 1);
    }

    #[test]
    fn check_state_hit_passes_miss_drops() {
        let clock = SystemClock::new();
        let acl = AclCompiler::compile(vec![rule(ActionKind::CheckState, None)]).unwrap();
        let handler = AclHandler::new("acl0", acl).with_state_checker(Arc::new(AlwaysHit));
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(80));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert_eq!(front.output.len(), 1);

        let acl = AclCompiler::compile(vec![rule(ActionKind::CheckState, None)]).unwrap();
        let handler = AclHandler::new("acl0", acl).with_state_checker(Arc::new(NeverHit));
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(80));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert_eq!(front.drop.len(), 1);
    }

    #[test]
    fn publish_swaps_table_for_next_batch() {
        let clock = SystemClock::new();
        let acl = AclCompiler::compile(vec![rule(ActionKind::Deny, None)]).unwrap();
        let handler = AclHandler::new("acl0", acl);
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(22));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert_eq!(front.drop.len(), 1);

        let acl2 = AclCompiler::compile(vec![rule(ActionKind::Pass, None)]).unwrap();
        handler.publish(acl2);
        let mut front = PacketFront::new();
        front.push_input(tcp_syn_descriptor(22));
        handler.handle(&mut front, &ctx(&clock)).unwrap();
        assert_eq!(front.output.len(), 1);
    }
}
