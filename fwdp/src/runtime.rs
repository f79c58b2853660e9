//! Wires a loaded [`DpConfig`] into a running set of pipelines plus an
//! [`Introspection`] registry. This is CLI-specific assembly, not library
//! surface — the library only supplies the building blocks (arena,
//! compiler, fwstate, pipeline runtime); the binary decides how a single
//! process's modules are named and composed.

use fwdp_lib::acl::{AclCompiler, AclHandler};
use fwdp_lib::arena::{Arena, MemoryContext};
use fwdp_lib::config::DpConfig;
use fwdp_lib::error::{FwdpError, Result};
use fwdp_lib::fwstate::FwState;
use fwdp_lib::introspection::{DeviceInfo, Introspection};
use fwdp_lib::pipeline::{Chain, Pipeline, PipelineFunction, PipelineModule};
use std::sync::Arc;

pub struct Built {
    pub pipelines: Vec<Pipeline>,
    pub introspection: Arc<Introspection>,
}

/// Resolve a module name referenced by a chain config to the one
/// constructed module instance it names. Only the two concrete pipeline
/// modules this crate ships (`acl`, `fwstate`) are recognized; anything
/// else is a configuration error rather than a silent no-op.
fn resolve_module(name: &str, acl: &Arc<AclHandler>, fwstate: &Arc<FwState>) -> Result<Arc<dyn PipelineModule>> {
    match name {
        "acl" => Ok(acl.clone() as Arc<dyn PipelineModule>),
        "fwstate" => Ok(fwstate.clone() as Arc<dyn PipelineModule>),
        other => Err(FwdpError::InvalidArgument(format!("unknown pipeline module {other:?}; expected \"acl\" or \"fwstate\""))),
    }
}

pub fn build(config: &DpConfig) -> Result<Built> {
    let now = 0;

    let compiled = AclCompiler::compile(config.acl_rules.iter().cloned().map(|r| r.into_rule()).collect::<Result<Vec<_>>>()?)?;

    let fwstate = Arc::new(FwState::new(
        "fwstate0",
        config.fwstate.index_size,
        config.fwstate.shard_count,
        config.fwstate.hash_fn,
        config.fwstate.seed,
        now,
        config.fwstate.timeouts.clone().into_timeouts(),
        config.fwstate.sync.clone().map(|s| s.into_transport_config()),
    )?);

    let acl = Arc::new(AclHandler::new("acl0", compiled).with_state_checker(fwstate.clone() as Arc<dyn fwdp_lib::acl::StateChecker>));

    let mut pipelines = Vec::with_capacity(config.pipelines.len());
    for pipeline_cfg in &config.pipelines {
        let mut functions = Vec::with_capacity(pipeline_cfg.functions.len());
        for function_cfg in &pipeline_cfg.functions {
            let mut chains = Vec::with_capacity(function_cfg.chains.len());
            for chain_cfg in &function_cfg.chains {
                let modules =
                    chain_cfg.modules.iter().map(|name| resolve_module(name, &acl, &fwstate)).collect::<Result<Vec<_>>>()?;
                chains.push(Chain { name: chain_cfg.name.clone(), weight: chain_cfg.weight, modules });
            }
            functions.push(PipelineFunction { name: function_cfg.name.clone(), chains });
        }
        pipelines.push(Pipeline::new(pipeline_cfg.name.clone(), functions));
    }

    let introspection = Arc::new(Introspection::new());
    introspection.publish_pipelines(&pipelines);
    introspection.publish_devices(config.devices.iter().map(|d| DeviceInfo { index: d.index, name: d.name.clone() }).collect());
    introspection.register_agent("dataplane", Arc::new(MemoryContext::new("dataplane", Arena::new(config.instance.dp_memory_bytes))));
    introspection.register_agent("control-plane", Arc::new(MemoryContext::new("control-plane", Arena::new(config.instance.cp_memory_bytes))));
    introspection.record_control_plane_update("acl", "acl0");
    introspection.record_control_plane_update("fwstate", "fwstate0");

    Ok(Built { pipelines, introspection })
}
