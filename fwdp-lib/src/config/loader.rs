use super::root::DpConfig;
use crate::error::{FwdpError, Result};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Read, parse, and validate a [`DpConfig`] from a TOML file (spec.md
/// §1 "a control-plane process ... reads configuration").
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<DpConfig> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| FwdpError::Config(format!("failed to read {}: {e}", path.as_ref().display())))?;
    let config: DpConfig = toml::from_str(&text).map_err(|e| FwdpError::Config(format!("failed to parse config: {e}")))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &DpConfig) -> Result<()> {
    if !config.fwstate.index_size.is_power_of_two() || config.fwstate.index_size == 0 {
        return Err(FwdpError::InvalidArgument(format!("fwstate.index_size {} must be a non-zero power of two", config.fwstate.index_size)));
    }
    if config.fwstate.shard_count == 0 {
        return Err(FwdpError::InvalidArgument("fwstate.shard_count must be > 0".into()));
    }
    if config.pipelines.is_empty() {
        return Err(FwdpError::InvalidArgument("at least one pipeline is required".into()));
    }

    let device_indices: HashSet<u16> = config.devices.iter().map(|d| d.index).collect();
    for rule in &config.acl_rules {
        for &device in &rule.devices {
            if !device_indices.is_empty() && !device_indices.contains(&device) {
                return Err(FwdpError::InvalidArgument(format!("acl rule references unknown device index {device}")));
            }
        }
    }

    for pipeline in &config.pipelines {
        for function in &pipeline.functions {
            if function.chains.is_empty() {
                return Err(FwdpError::InvalidArgument(format!("pipeline {:?} function {:?} has no chains", pipeline.name, function.name)));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
        [instance]
        dp_memory_bytes = 1048576
        cp_memory_bytes = 65536

        [fwstate]
        index_size = 1024
        shard_count = 4

        [[pipelines]]
        name = "p0"
        [[pipelines.functions]]
        name = "f0"
        [[pipelines.functions.chains]]
        name = "c0"
        modules = ["acl0", "fwstate0"]
    "#;

    #[test]
    fn loads_minimal_valid_config() {
        let file = write_fixture(MINIMAL);
        let config = load_from_path(file.path()).unwrap();
        assert_eq!(config.pipelines.len(), 1);
        assert_eq!(config.fwstate.index_size, 1024);
    }

    #[test]
    fn rejects_non_power_of_two_index_size() {
        let file = write_fixture(&MINIMAL.replace("index_size = 1024", "index_size = 1000"));
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn rejects_acl_rule_referencing_unknown_device() {
        let contents = MINIMAL.replace(
            "[[pipelines]]",
            "[[devices]]\nindex = 0\nname = \"eth0\"\n\n[[acl_rules]]\ndevices = [3]\naction = \"pass\"\n\n[[pipelines]]",
        );
        let file = write_fixture(&contents);
        assert!(load_from_path(file.path()).is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = load_from_path("/nonexistent/path/fwdp.toml").unwrap_err();
        assert!(matches!(err, FwdpError::Config(_)));
    }
}
