use super::acl::AclRuleConfig;
use super::device::DeviceConfig;
use super::fwstate::FwstateConfig;
use super::instance::InstanceConfig;
use super::pipeline::PipelineConfig;
use serde::Deserialize;

/// Top-level dataplane configuration (spec.md §1, §4 module list).
/// Everything a running instance needs to build its arena, compile its
/// ACL, construct its `fwstate`, and wire up its pipelines.
#[derive(Debug, Clone, Deserialize)]
pub struct DpConfig {
    pub instance: InstanceConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    pub fwstate: FwstateConfig,
    #[serde(default)]
    pub acl_rules: Vec<AclRuleConfig>,
    pub pipelines: Vec<PipelineConfig>,
}
