//! Configuration layer (spec.md §2 ambient stack): TOML on disk,
//! deserialized with `serde`, validated for referential integrity before
//! any arena or fwmap is built from it — mirrors the teacher's
//! `config/{root,loader}.rs` split, one file per config section.

mod acl;
mod device;
mod fwstate;
mod instance;
mod loader;
mod pipeline;
mod root;

pub use acl::AclRuleConfig;
pub use device::DeviceConfig;
pub use fwstate::{FwstateConfig, SyncConfig, TimeoutsConfig};
pub use instance::InstanceConfig;
pub use loader::load_from_path;
pub use pipeline::{ChainConfig, FunctionConfig, PipelineConfig};
pub use root::DpConfig;
