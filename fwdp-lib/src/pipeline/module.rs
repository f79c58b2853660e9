//! Module dispatch (spec.md §2 "Pipeline Runtime", Design Notes §9
//! "`container_of` + embedded base `module` struct").
//!
//! The original C dataplane gives every module kind an embedded common
//! header struct and recovers the concrete type with `container_of`
//! before dispatching through a function-pointer table keyed by kind.
//! Rust's trait objects are the direct idiomatic replacement: a `dyn
//! PipelineModule` already carries its own vtable, so there is no
//! separate kind tag or manual downcast needed — `ModuleKind` is kept
//! only where the introspection API needs to report a module's kind as
//! data (spec.md §6 "List control-plane modules: `(type, name,
//! generation)`").

use super::packet::PacketFront;
use crate::clock::DpClock;
use crate::error::Result;
use crate::logging::DpLogger;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Acl,
    FwState,
    Pdump,
    Passthrough,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleKind::Acl => "acl",
            ModuleKind::FwState => "fwstate",
            ModuleKind::Pdump => "pdump",
            ModuleKind::Passthrough => "passthrough",
        }
    }
}

/// Per-batch context handed to every module handler: which worker is
/// running it, the current timestamp, and a logger scoped to the
/// module.
pub struct HandlerContext<'a> {
    pub worker_idx: usize,
    pub now: u64,
    pub logger: DpLogger,
    pub clock: &'a dyn DpClock,
}

/// A pipeline stage. A handler must fully drain `front.input` before
/// returning (spec.md §4.10).
pub trait PipelineModule: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> ModuleKind;
    fn handle(&self, front: &mut PacketFront, ctx: &HandlerContext<'_>) -> Result<()>;
}

/// A named, ordered sequence of modules — one "chain" in the
/// introspection API's `(name, weight, [module_refs])` shape (spec.md
/// §6 "List functions"). `weight` has no scheduling effect in this
/// single-threaded-per-worker model; it is carried through purely for
/// introspection parity with the control plane's richer original, which
/// load-balances among redundant chains.
pub struct Chain {
    pub name: String,
    pub weight: f32,
    pub modules: Vec<Arc<dyn PipelineModule>>,
}

/// One pipeline function: a named group of chains. A function with a
/// single chain (the common case here) is indistinguishable at runtime
/// from "the ordered module list" spec.md §4.10 describes; multiple
/// chains exist purely for the introspection surface.
pub struct PipelineFunction {
    pub name: String,
    pub chains: Vec<Chain>,
}

impl PipelineFunction {
    /// The common case: one function, one chain, in declaration order.
    pub fn single_chain(name: impl Into<String>, modules: Vec<Arc<dyn PipelineModule>>) -> Self {
        let name = name.into();
        Self { name: name.clone(), chains: vec![Chain { name, weight: 1.0, modules }] }
    }

    /// Flattened module list in the order a packet actually traverses
    /// them: the first chain by weight order (ties broken by
    /// declaration order), since this dataplane does not implement
    /// chain load-balancing at runtime.
    pub fn primary_modules(&self) -> &[Arc<dyn PipelineModule>] {
        self.chains
            .iter()
            .max_by(|a, b| a.weight.partial_cmp(&b.weight).unwrap_or(std::cmp::Ordering::Equal))
            .map(|c| c.modules.as_slice())
            .unwrap_or(&[])
    }
}
