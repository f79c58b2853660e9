//! Read-only introspection API (spec.md §6): a set of snapshot queries a
//! control-plane client can poll without ever blocking a worker.
//!
//! Every list here is published the same way [`AclHandler::publish`]
//! (crate::acl::handler) swaps in a freshly compiled table: a whole new
//! `Arc<Vec<_>>` built off the hot path, then one `ArcSwap::store`. A
//! reader always sees a complete, consistent snapshot, never a partially
//! updated list.

use crate::arena::MemoryTotals;
use crate::pipeline::{ModuleKind, Pipeline};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One dataplane module as it appears inside a running pipeline (spec.md
/// §6 "List dataplane modules: for each, `(name, kind)`").
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    pub name: String,
    pub kind: ModuleKind,
}

#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub name: String,
    pub weight: f32,
    pub modules: Vec<ModuleInfo>,
}

#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub chains: Vec<ChainInfo>,
}

/// spec.md §6 "List pipelines" / "List functions".
#[derive(Debug, Clone)]
pub struct PipelineInfo {
    pub name: String,
    pub functions: Vec<FunctionInfo>,
}

/// spec.md §6 "List devices: for each, `(index, name)`".
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub index: u16,
    pub name: String,
}

/// spec.md §6 "List agents: for each, memory totals (`allocated`,
/// `freed`, in-use)".
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub name: String,
    pub totals: MemoryTotals,
}

/// spec.md §6 "List control-plane modules: `(type, name, generation)`".
/// `generation` counts how many times this module has been republished
/// (an ACL recompile, a `fwstate` layer rotation), so a client can tell
/// whether its cached view is stale without diffing the whole list.
#[derive(Debug, Clone)]
pub struct ControlPlaneModuleInfo {
    pub kind: &'static str,
    pub name: String,
    pub generation: u64,
}

fn pipeline_snapshot(pipeline: &Pipeline) -> PipelineInfo {
    PipelineInfo {
        name: pipeline.name.clone(),
        functions: pipeline
            .functions
            .iter()
            .map(|function| FunctionInfo {
                name: function.name.clone(),
                chains: function
                    .chains
                    .iter()
                    .map(|chain| ChainInfo {
                        name: chain.name.clone(),
                        weight: chain.weight,
                        modules: chain.modules.iter().map(|m| ModuleInfo { name: m.name().to_string(), kind: m.kind() }).collect(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

struct TrackedAgent {
    name: String,
    context: Arc<crate::arena::MemoryContext>,
}

struct TrackedModule {
    kind: &'static str,
    name: String,
    generation: AtomicU64,
}

/// The registry a control-plane process holds and populates as it
/// constructs pipelines, agents, and control-plane modules; a client
/// reads through its `list_*` methods.
#[derive(Default)]
pub struct Introspection {
    pipelines: ArcSwap<Vec<PipelineInfo>>,
    devices: ArcSwap<Vec<DeviceInfo>>,
    agents: ArcSwap<Vec<TrackedAgent>>,
    control_plane_modules: ArcSwap<Vec<TrackedModule>>,
}

impl Introspection {
    pub fn new() -> Self {
        Self {
            pipelines: ArcSwap::new(Arc::new(Vec::new())),
            devices: ArcSwap::new(Arc::new(Vec::new())),
            agents: ArcSwap::new(Arc::new(Vec::new())),
            control_plane_modules: ArcSwap::new(Arc::new(Vec::new())),
        }
    }

    /// Publish the current set of running pipelines (spec.md §6 "List
    /// pipelines"/"List functions"). Called whenever a pipeline is
    /// (re)built, never from the per-packet hot path.
    pub fn publish_pipelines(&self, pipelines: &[Pipeline]) {
        self.pipelines.store(Arc::new(pipelines.iter().map(pipeline_snapshot).collect()));
    }

    pub fn publish_devices(&self, devices: Vec<DeviceInfo>) {
        self.devices.store(Arc::new(devices));
    }

    /// Register a named memory context for the "List agents" query. Safe
    /// to call again with the same name to replace a prior registration
    /// (e.g. on a control-plane restart of that agent).
    pub fn register_agent(&self, name: impl Into<String>, context: Arc<crate::arena::MemoryContext>) {
        let name = name.into();
        let current = self.agents.load();
        let mut next: Vec<TrackedAgent> = current.iter().filter(|a| a.name != name).map(|a| TrackedAgent { name: a.name.clone(), context: a.context.clone() }).collect();
        next.push(TrackedAgent { name, context });
        self.agents.store(Arc::new(next));
    }

    /// Register a control-plane module at generation 0, or bump its
    /// generation if already registered (a recompile, a layer rotation).
    pub fn record_control_plane_update(&self, kind: &'static str, name: impl Into<String>) {
        let name = name.into();
        let current = self.control_plane_modules.load();
        if let Some(existing) = current.iter().find(|m| m.kind == kind && m.name == name) {
            existing.generation.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let mut next: Vec<TrackedModule> = current
            .iter()
            .map(|m| TrackedModule { kind: m.kind, name: m.name.clone(), generation: AtomicU64::new(m.generation.load(Ordering::Relaxed)) })
            .collect();
        next.push(TrackedModule { kind, name, generation: AtomicU64::new(0) });
        self.control_plane_modules.store(Arc::new(next));
    }

    pub fn list_pipelines(&self) -> Vec<PipelineInfo> {
        self.pipelines.load().as_ref().clone()
    }

    /// Flattened dataplane module list across every published pipeline
    /// (spec.md §6 "List dataplane modules").
    pub fn list_dataplane_modules(&self) -> Vec<ModuleInfo> {
        self.pipelines
            .load()
            .iter()
            .flat_map(|p| p.functions.iter())
            .flat_map(|f| f.chains.iter())
            .flat_map(|c| c.modules.iter().cloned())
            .collect()
    }

    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        self.devices.load().as_ref().clone()
    }

    pub fn list_agents(&self) -> Vec<AgentInfo> {
        self.agents.load().iter().map(|a| AgentInfo { name: a.name.clone(), totals: a.context.totals() }).collect()
    }

    pub fn list_control_plane_modules(&self) -> Vec<ControlPlaneModuleInfo> {
        self.control_plane_modules
            .load()
            .iter()
            .map(|m| ControlPlaneModuleInfo { kind: m.kind, name: m.name.clone(), generation: m.generation.load(Ordering::Relaxed) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::{Arena, MemoryContext};
    use crate::pipeline::{HandlerContext, PacketFront, PipelineFunction, PipelineModule};
    use std::sync::Arc;

    struct NoOp(&'static str, ModuleKind);
    impl PipelineModule for NoOp {
        fn name(&self) -> &str {
            self.0
        }
        fn kind(&self) -> ModuleKind {
            self.1
        }
        fn handle(&self, _front: &mut PacketFront, _ctx: &HandlerContext<'_>) -> crate::error::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn publishes_and_lists_pipeline_modules() {
        let introspection = Introspection::new();
        let pipeline = Pipeline::new("p0", vec![PipelineFunction::single_chain("f0", vec![Arc::new(NoOp("acl0", ModuleKind::Acl)), Arc::new(NoOp("fwstate0", ModuleKind::FwState))])]);
        introspection.publish_pipelines(std::slice::from_ref(&pipeline));

        let pipelines = introspection.list_pipelines();
        assert_eq!(pipelines.len(), 1);
        assert_eq!(pipelines[0].functions[0].chains[0].modules.len(), 2);

        let modules = introspection.list_dataplane_modules();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name, "acl0");
    }

    #[test]
    fn lists_devices_and_agents() {
        let introspection = Introspection::new();
        introspection.publish_devices(vec![DeviceInfo { index: 0, name: "eth0".into() }]);
        assert_eq!(introspection.list_devices().len(), 1);

        let ctx = Arc::new(MemoryContext::new("acl", Arena::new(1 << 16)));
        ctx.alloc(128).unwrap();
        introspection.register_agent("acl", ctx);
        let agents = introspection.list_agents();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0].totals.allocated, 128);
    }

    #[test]
    fn control_plane_module_generation_bumps_on_repeat_update() {
        let introspection = Introspection::new();
        introspection.record_control_plane_update("acl", "acl0");
        introspection.record_control_plane_update("acl", "acl0");
        let modules = introspection.list_control_plane_modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].generation, 1);
    }
}
