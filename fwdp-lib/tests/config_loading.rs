//! Loads a full configuration fixture (instance, devices, fwstate, ACL
//! rules, pipeline) and checks it turns into a compilable ACL and a
//! constructible `fwstate`, exercising the config/compiler/fwstate seam
//! the `fwdp` binary drives at startup.

use fwdp_lib::acl::AclCompiler;
use fwdp_lib::config::load_from_path;
use fwdp_lib::fwstate::FwState;
use std::io::Write;

const FIXTURE: &str = r#"
[instance]
numa_idx = 0
dp_memory_bytes = 1048576
cp_memory_bytes = 65536

[[devices]]
index = 0
name = "eth0"

[[devices]]
index = 1
name = "eth1"

[fwstate]
index_size = 256
shard_count = 2
hash_fn = "fnv1a"
seed = 42

[fwstate.timeouts]
tcp = 60

[[acl_rules]]
devices = [0]
src_net = "10.0.0.0/8"
dst_port = [22, 22]
proto = 6
action = "pass"
keep_state = true

[[acl_rules]]
devices = [0]
action = "deny"

[[pipelines]]
name = "p0"

[[pipelines.functions]]
name = "f0"

[[pipelines.functions.chains]]
name = "c0"
modules = ["acl", "fwstate"]
"#;

#[test]
fn full_fixture_loads_and_compiles() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FIXTURE.as_bytes()).unwrap();

    let config = load_from_path(file.path()).unwrap();
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.fwstate.timeouts.tcp, 60);
    assert_eq!(config.fwstate.timeouts.udp, fwdp_lib::fwstate::Timeouts::default().udp, "unset fields keep defaults");

    let rules: Vec<_> = config.acl_rules.into_iter().map(|r| r.into_rule().unwrap()).collect();
    assert_eq!(rules.len(), 2);
    let compiled = AclCompiler::compile(rules).unwrap();
    let actions = compiled.classify_v4("10.1.2.3".parse().unwrap(), "1.1.1.1".parse().unwrap(), 4000, 22, 6, 0);
    assert!(!actions.is_empty());

    let fwstate = FwState::new("fwstate0", config.fwstate.index_size, config.fwstate.shard_count, config.fwstate.hash_fn, config.fwstate.seed, 0, config.fwstate.timeouts.into_timeouts(), None);
    assert!(fwstate.is_ok());
}
