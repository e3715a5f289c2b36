//! Declarative parameter specifications

use serde::{Deserialize, Serialize};
use std::fmt;

pub const GROUP_IPV4: &str = "ipv4_network_security";
pub const GROUP_IPV6: &str = "ipv6_network_security";
pub const GROUP_KERNEL: &str = "kernel_security";
pub const GROUP_NETWORK: &str = "network_hardening";

/// Group names in reporting order
pub const GROUPS: [&str; 4] = [GROUP_IPV4, GROUP_IPV6, GROUP_KERNEL, GROUP_NETWORK];

/// Group a parameter belongs to, by name prefix
pub fn group_for(name: &str) -> &'static str {
    if name.starts_with("net.ipv4.") {
        GROUP_IPV4
    } else if name.starts_with("net.ipv6.") {
        GROUP_IPV6
    } else if name.starts_with("kernel.") || name.starts_with("fs.") {
        GROUP_KERNEL
    } else {
        GROUP_NETWORK
    }
}

/// Compare values the way the kernel reports them: whitespace runs are insignificant
pub fn values_match(current: &str, desired: &str) -> bool {
    current.split_whitespace().eq(desired.split_whitespace())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "LOW",
            ImpactLevel::Medium => "MEDIUM",
            ImpactLevel::High => "HIGH",
        }
    }
}

impl fmt::Display for ImpactLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceImpact {
    pub level: ImpactLevel,
    pub rationale: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictNote {
    pub description: String,
    pub warning: String,
}

/// Host inspections that reveal a likely conflict with a desired value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveProbe {
    /// The host has an IPv4 default route
    DefaultRoute,
    /// The host has any IPv6 routes
    Ipv6Routes,
}

impl LiveProbe {
    pub fn warning(&self) -> &'static str {
        match self {
            LiveProbe::DefaultRoute => {
                "System has routing configured; verify it is not acting as a router or gateway"
            }
            LiveProbe::Ipv6Routes => {
                "System has IPv6 routing configured; disabling forwarding may break IPv6 routing"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub desired: String,
    pub group: String,
    #[serde(default)]
    pub reboot_required: bool,
    #[serde(default)]
    pub impact: Option<PerformanceImpact>,
    #[serde(default)]
    pub conflict: Option<ConflictNote>,
    #[serde(default)]
    pub probe: Option<LiveProbe>,
}

impl ParameterSpec {
    pub fn new(name: &str, desired: &str) -> Self {
        Self {
            name: name.to_string(),
            desired: desired.to_string(),
            group: group_for(name).to_string(),
            reboot_required: false,
            impact: None,
            conflict: None,
            probe: None,
        }
    }

    pub fn requires_reboot(mut self) -> Self {
        self.reboot_required = true;
        self
    }

    pub fn with_impact(mut self, level: ImpactLevel, rationale: &str, mitigation: &str) -> Self {
        self.impact = Some(PerformanceImpact {
            level,
            rationale: rationale.to_string(),
            mitigation: mitigation.to_string(),
        });
        self
    }

    pub fn with_conflict(mut self, description: &str, warning: &str) -> Self {
        self.conflict = Some(ConflictNote {
            description: description.to_string(),
            warning: warning.to_string(),
        });
        self
    }

    pub fn with_probe(mut self, probe: LiveProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn is_satisfied_by(&self, current: &str) -> bool {
        values_match(current, &self.desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouping() {
        assert_eq!(group_for("net.ipv4.tcp_syncookies"), GROUP_IPV4);
        assert_eq!(group_for("net.ipv6.conf.all.forwarding"), GROUP_IPV6);
        assert_eq!(group_for("fs.suid_dumpable"), GROUP_KERNEL);
        assert_eq!(group_for("vm.mmap_min_addr"), GROUP_NETWORK);
    }

    #[test]
    fn test_value_matching() {
        assert!(values_match("4096\t87380  6291456", "4096 87380 6291456"));
        assert!(values_match(" 1\n", "1"));
        assert!(!values_match("0", "1"));
        assert!(ParameterSpec::new("kernel.kptr_restrict", "2").is_satisfied_by("2"));
    }
}
