use serde::Deserialize;

/// One chain within a function (spec.md §6 "List functions: for each,
/// `(name, weight, [chain refs])`"). `modules` names pipeline modules by
/// the name they were constructed with (`acl.module_name` in `[[acl]]`'s
/// section, or one of the built-in module kinds for `fwstate`/`pdump`).
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
    pub modules: Vec<String>,
}

fn default_weight() -> f32 {
    1.0
}

/// One pipeline function: a named, ordered stage made of one or more
/// chains (spec.md §4.10). The common case is one chain per function;
/// multiple chains exist purely so the introspection surface can report
/// the richer shape spec.md §6 describes.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionConfig {
    pub name: String,
    pub chains: Vec<ChainConfig>,
}

/// One pipeline: an ordered list of functions a packet traverses
/// (spec.md §4.10).
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub functions: Vec<FunctionConfig>,
}
