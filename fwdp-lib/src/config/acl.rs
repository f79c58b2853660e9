use crate::acl::{ACL_RULE_KEEP_STATE_FLAG, ACL_RULE_LOG_FLAG};
use crate::acl::{AclRule, ActionKind, PortRange};
use crate::error::{FwdpError, Result};
use ipnet::IpNet;
use serde::Deserialize;

/// On-disk form of one ACL rule (spec.md §4.4 "Input"). Validated and
/// turned into a compiler-ready [`AclRule`] by [`AclRuleConfig::into_rule`]
/// rather than deriving `AclRule` itself, since the wire/config
/// representation (a device name list, a string action, a `log`/
/// `keep_state` pair of bools) is deliberately friendlier than the
/// compiler's packed/typed fields.
#[derive(Debug, Clone, Deserialize)]
pub struct AclRuleConfig {
    /// Device indices this rule applies to; empty means "every device"
    /// (spec.md §4.4 "category_mask").
    #[serde(default)]
    pub devices: Vec<u16>,
    #[serde(default)]
    pub src_net: Option<String>,
    #[serde(default)]
    pub dst_net: Option<String>,
    #[serde(default)]
    pub proto: Option<u8>,
    #[serde(default)]
    pub tcp_flags: Option<u8>,
    #[serde(default)]
    pub src_port: Option<(u16, u16)>,
    #[serde(default)]
    pub dst_port: Option<(u16, u16)>,
    pub action: String,
    #[serde(default)]
    pub non_terminate: bool,
    #[serde(default)]
    pub log: bool,
    #[serde(default)]
    pub keep_state: bool,
}

fn parse_net(field: &str, value: &Option<String>) -> Result<Option<IpNet>> {
    match value {
        None => Ok(None),
        Some(text) => text
            .parse::<IpNet>()
            .map(Some)
            .map_err(|e| FwdpError::InvalidArgument(format!("acl rule {field} {text:?}: {e}"))),
    }
}

fn devices_mask(devices: &[u16]) -> u16 {
    if devices.is_empty() {
        return 0xFFFF;
    }
    devices.iter().fold(0u16, |mask, &d| if d < 16 { mask | (1u16 << d) } else { mask })
}

impl AclRuleConfig {
    pub fn into_rule(self) -> Result<AclRule> {
        let action_kind = match self.action.as_str() {
            "pass" => ActionKind::Pass,
            "deny" => ActionKind::Deny,
            "count" => ActionKind::Count,
            "check_state" => ActionKind::CheckState,
            other => return Err(FwdpError::InvalidArgument(format!("unknown acl action {other:?}"))),
        };
        let mut flags = 0u8;
        if self.log {
            flags |= ACL_RULE_LOG_FLAG;
        }
        if self.keep_state {
            flags |= ACL_RULE_KEEP_STATE_FLAG;
        }
        Ok(AclRule {
            devices: devices_mask(&self.devices),
            src_net: parse_net("src_net", &self.src_net)?,
            dst_net: parse_net("dst_net", &self.dst_net)?,
            proto: self.proto,
            tcp_flags: self.tcp_flags,
            src_port: self.src_port.map(|(a, b)| PortRange(a, b)),
            dst_port: self.dst_port.map(|(a, b)| PortRange(a, b)),
            action_kind,
            non_terminate: self.non_terminate,
            action_flags: flags,
        })
    }
}
