//! Per-artifact-class interpretation of command results
//!
//! Different tools signal "already in the desired state" or "not applicable
//! here" in different ways. Each class decides what counts as success.

use super::CommandOutput;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactClass {
    /// systemctl and friends
    ServiceManager,
    /// sysctl
    KernelParameters,
    /// apt-get, dpkg
    PackageManager,
    /// auditctl, augenrules, apparmor, ufw
    SecurityModule,
    Generic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandVerdict {
    Success,
    /// Not applied, but not a failure either (e.g. the unit or key does not exist)
    Warning(String),
    Failure(String),
}

impl CommandVerdict {
    pub fn is_failure(&self) -> bool {
        matches!(self, CommandVerdict::Failure(_))
    }
}

impl ArtifactClass {
    /// Pick the class from the program being run
    pub fn for_program(program: &str) -> Self {
        let name = program.rsplit('/').next().unwrap_or(program);
        match name {
            "systemctl" | "service" => ArtifactClass::ServiceManager,
            "sysctl" => ArtifactClass::KernelParameters,
            "apt" | "apt-get" | "dpkg" | "dpkg-query" => ArtifactClass::PackageManager,
            "auditctl" | "augenrules" | "apparmor_parser" | "aa-enforce" | "ufw" => {
                ArtifactClass::SecurityModule
            }
            _ => ArtifactClass::Generic,
        }
    }

    pub fn classify(&self, output: &CommandOutput) -> CommandVerdict {
        if output.exit_code == 0 {
            return CommandVerdict::Success;
        }

        let stderr = output.stderr.trim();
        let lower = stderr.to_ascii_lowercase();
        let failure = || {
            CommandVerdict::Failure(format!(
                "exit {}: {}",
                output.exit_code,
                if stderr.is_empty() { "no error output" } else { stderr }
            ))
        };

        match self {
            ArtifactClass::ServiceManager => {
                if lower.contains("does not exist")
                    || lower.contains("not loaded")
                    || lower.contains("no such file")
                {
                    CommandVerdict::Warning(format!("unit not present: {}", stderr))
                } else {
                    failure()
                }
            }
            ArtifactClass::KernelParameters => {
                if lower.contains("cannot stat /proc/sys") || lower.contains("unknown key") {
                    CommandVerdict::Warning(format!("parameter not available: {}", stderr))
                } else {
                    failure()
                }
            }
            ArtifactClass::PackageManager => {
                if lower.contains("is not installed") {
                    CommandVerdict::Warning(format!("package not installed: {}", stderr))
                } else {
                    failure()
                }
            }
            ArtifactClass::SecurityModule => {
                if lower.contains("immutable") {
                    CommandVerdict::Warning(format!("takes effect after reboot: {}", stderr))
                } else {
                    failure()
                }
            }
            ArtifactClass::Generic => failure(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code: code,
            stderr: stderr.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_program_mapping() {
        assert_eq!(ArtifactClass::for_program("/usr/bin/systemctl"), ArtifactClass::ServiceManager);
        assert_eq!(ArtifactClass::for_program("sysctl"), ArtifactClass::KernelParameters);
        assert_eq!(ArtifactClass::for_program("apt-get"), ArtifactClass::PackageManager);
        assert_eq!(ArtifactClass::for_program("auditctl"), ArtifactClass::SecurityModule);
        assert_eq!(ArtifactClass::for_program("chmod"), ArtifactClass::Generic);
    }

    #[test]
    fn test_missing_unit_is_warning() {
        let verdict = ArtifactClass::ServiceManager
            .classify(&output(1, "Failed to disable unit: Unit file autofs.service does not exist."));
        assert!(matches!(verdict, CommandVerdict::Warning(_)));
    }

    #[test]
    fn test_missing_sysctl_key_is_warning() {
        let verdict = ArtifactClass::KernelParameters.classify(&output(
            255,
            "sysctl: cannot stat /proc/sys/net/ipv6/conf/all/forwarding: No such file or directory",
        ));
        assert!(matches!(verdict, CommandVerdict::Warning(_)));
    }

    #[test]
    fn test_generic_nonzero_is_failure() {
        assert!(ArtifactClass::Generic.classify(&output(2, "")).is_failure());
        assert_eq!(ArtifactClass::Generic.classify(&output(0, "noise")), CommandVerdict::Success);
    }
}
