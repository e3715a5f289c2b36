//! Kernel parameter catalog for Ubuntu 20.04

use super::spec::{ImpactLevel, LiveProbe, ParameterSpec};

/// Hardened kernel parameter set with impact, reboot and conflict metadata
pub fn ubuntu_kernel_catalog() -> Vec<ParameterSpec> {
    let plain = |name: &str, value: &str| ParameterSpec::new(name, value);

    vec![
        plain("net.ipv4.conf.all.rp_filter", "1"),
        plain("net.ipv4.conf.default.rp_filter", "1"),
        plain("net.ipv4.conf.all.accept_source_route", "0"),
        plain("net.ipv4.conf.default.accept_source_route", "0"),
        plain("net.ipv4.conf.all.accept_redirects", "0"),
        plain("net.ipv4.conf.default.accept_redirects", "0"),
        plain("net.ipv4.conf.all.secure_redirects", "0"),
        plain("net.ipv4.conf.default.secure_redirects", "0"),
        plain("net.ipv4.conf.all.send_redirects", "0"),
        plain("net.ipv4.conf.default.send_redirects", "0"),
        plain("net.ipv4.icmp_echo_ignore_broadcasts", "1"),
        plain("net.ipv4.icmp_ignore_bogus_error_responses", "1"),
        plain("net.ipv4.tcp_syncookies", "1").with_impact(
            ImpactLevel::Medium,
            "SYN cookies protect against SYN floods but may affect connection tracking",
            "Impact is minimal on modern systems",
        ),
        plain("net.ipv4.conf.all.log_martians", "1").with_impact(
            ImpactLevel::Medium,
            "Logging martian packets can generate significant log volume under attack",
            "Ensure adequate log storage and rotation",
        ),
        plain("net.ipv4.conf.default.log_martians", "1"),
        plain("net.ipv4.ip_forward", "0")
            .with_impact(
                ImpactLevel::High,
                "Disabling IP forwarding breaks routing",
                "Only enable on systems that require routing or NAT",
            )
            .with_conflict(
                "IP forwarding is disabled but may be needed for routers and NAT gateways",
                "This will break routing if the system acts as a router",
            )
            .with_probe(LiveProbe::DefaultRoute),
        plain("net.ipv6.conf.all.accept_source_route", "0"),
        plain("net.ipv6.conf.default.accept_source_route", "0"),
        plain("net.ipv6.conf.all.accept_redirects", "0"),
        plain("net.ipv6.conf.default.accept_redirects", "0"),
        plain("net.ipv6.conf.all.forwarding", "0")
            .with_impact(
                ImpactLevel::High,
                "Disabling IPv6 forwarding breaks IPv6 routing",
                "Only enable on systems that require IPv6 routing",
            )
            .with_conflict(
                "IPv6 forwarding is disabled but may be needed for IPv6 routers",
                "This will break IPv6 routing",
            )
            .with_probe(LiveProbe::Ipv6Routes),
        plain("kernel.dmesg_restrict", "1").requires_reboot(),
        plain("kernel.kptr_restrict", "2").requires_reboot(),
        plain("kernel.yama.ptrace_scope", "1"),
        plain("kernel.randomize_va_space", "2")
            .requires_reboot()
            .with_impact(
                ImpactLevel::Low,
                "ASLR has minimal performance impact on modern systems",
                "No mitigation needed",
            ),
        plain("fs.suid_dumpable", "0").requires_reboot(),
        plain("net.ipv4.conf.all.arp_filter", "1"),
        plain("net.ipv4.conf.all.arp_announce", "2"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::spec::{GROUPS, GROUP_KERNEL};
    use std::collections::HashSet;

    #[test]
    fn test_catalog_shape() {
        let catalog = ubuntu_kernel_catalog();
        let names: HashSet<_> = catalog.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), catalog.len());

        assert_eq!(catalog.iter().filter(|s| s.reboot_required).count(), 4);
        assert_eq!(catalog.iter().filter(|s| s.probe.is_some()).count(), 2);
        assert!(catalog.iter().all(|s| GROUPS.contains(&s.group.as_str())));
        assert_eq!(catalog.iter().filter(|s| s.group == GROUP_KERNEL).count(), 5);
    }
}
