//! Per-component settings sections of [`EngineConfig`](super::EngineConfig)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use stig_runtime::limits::{coordination, execution, remediation};

fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}

// ============================================================================
// PREFLIGHT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreflightSettings {
    pub os_release_path: PathBuf,
    /// Substring that must appear in the os-release file
    pub expected_os: String,
    pub min_free_space_mb: u64,
    /// Filesystem whose free space is measured
    pub free_space_path: PathBuf,
    pub backup_dir: PathBuf,
    pub critical_files: Vec<PathBuf>,
    pub lock_files: Vec<PathBuf>,
    pub dns_probe_host: String,
    pub ping_probe_address: String,
    /// Paths whose presence means the host can be snapshotted by its hypervisor or runtime
    pub virtualization_markers: Vec<PathBuf>,
}

impl Default for PreflightSettings {
    fn default() -> Self {
        Self {
            os_release_path: PathBuf::from("/etc/os-release"),
            expected_os: "Ubuntu 20.04".to_string(),
            min_free_space_mb: remediation::DEFAULT_MIN_FREE_SPACE_MB,
            free_space_path: PathBuf::from("/"),
            backup_dir: PathBuf::from("/var/backups/stig-remediation"),
            critical_files: paths(&[
                "/etc/ssh/sshd_config",
                "/etc/pam.d/common-auth",
                "/etc/pam.d/common-password",
                "/etc/sudoers",
                "/etc/login.defs",
            ]),
            lock_files: paths(&[
                "/var/lib/dpkg/lock",
                "/var/lib/dpkg/lock-frontend",
                "/var/lib/apt/lists/lock",
            ]),
            dns_probe_host: "archive.ubuntu.com".to_string(),
            ping_probe_address: "8.8.8.8".to_string(),
            virtualization_markers: paths(&["/var/run/libvirt", "/proc/vz", "/.dockerenv"]),
        }
    }
}

// ============================================================================
// RECOVERY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub storage_root: PathBuf,
    pub critical_files: Vec<PathBuf>,
    pub critical_directories: Vec<PathBuf>,
    pub retention_days: u32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("/var/lib/stig-recovery"),
            critical_files: paths(&[
                "/etc/ssh/sshd_config",
                "/etc/pam.d/common-auth",
                "/etc/pam.d/common-password",
                "/etc/pam.d/common-account",
                "/etc/pam.d/common-session",
                "/etc/security/pwquality.conf",
                "/etc/security/faillock.conf",
                "/etc/sudoers",
                "/etc/login.defs",
                "/etc/sysctl.conf",
                "/etc/default/grub",
                "/etc/audit/auditd.conf",
            ]),
            critical_directories: paths(&[
                "/etc/sysctl.d",
                "/etc/audit/rules.d",
                "/etc/sudoers.d",
                "/etc/modprobe.d",
                "/etc/systemd/system",
            ]),
            retention_days: remediation::DEFAULT_RETENTION_DAYS,
        }
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSettings {
    /// File the desired values are persisted to
    pub store_path: PathBuf,
    /// Individual files scanned for persisted values
    pub persistence_files: Vec<PathBuf>,
    /// Directories whose `*.conf` files are scanned for persisted values
    pub persistence_dirs: Vec<PathBuf>,
}

impl Default for ParameterSettings {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("/etc/sysctl.d/99-stig-remediation.conf"),
            persistence_files: paths(&["/etc/sysctl.conf"]),
            persistence_dirs: paths(&["/etc/sysctl.d"]),
        }
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub sshd_config: PathBuf,
    pub sudoers: PathBuf,
    pub pam_dir: PathBuf,
    pub pam_files: Vec<String>,
    pub grub_defaults: PathBuf,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            sshd_config: PathBuf::from("/etc/ssh/sshd_config"),
            sudoers: PathBuf::from("/etc/sudoers"),
            pam_dir: PathBuf::from("/etc/pam.d"),
            pam_files: ["common-auth", "common-password", "common-account", "common-session"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            grub_defaults: PathBuf::from("/etc/default/grub"),
        }
    }
}

// ============================================================================
// COORDINATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub parallel: bool,
    pub max_workers: usize,
    /// Timeout for the full remote remediation
    pub remediation_timeout_secs: u64,
    /// Timeout for discrete remote commands
    pub command_timeout_secs: u64,
    /// Where the payload is delivered on each host
    pub remote_payload_path: String,
    /// Where the engine configuration is delivered on each host
    pub remote_config_path: String,
    /// Arguments passed to the payload after `--config <remote_config_path>`
    pub payload_args: Vec<String>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: coordination::DEFAULT_MAX_WORKERS,
            remediation_timeout_secs: execution::DEFAULT_REMEDIATION_TIMEOUT_SECS,
            command_timeout_secs: execution::DEFAULT_COMMAND_TIMEOUT_SECS,
            remote_payload_path: "/tmp/stig-remediate".to_string(),
            remote_config_path: "/tmp/stig-remediate.toml".to_string(),
            payload_args: vec!["run".to_string()],
        }
    }
}

impl CoordinatorConfig {
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_remediation_timeout(mut self, timeout: Duration) -> Self {
        self.remediation_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_secs = timeout.as_secs();
        self
    }

    /// Worker count after clamping to `1..=MAX_WORKERS_CEILING`
    pub fn effective_workers(&self) -> usize {
        self.max_workers.clamp(1, coordination::MAX_WORKERS_CEILING)
    }

    pub fn remediation_timeout(&self) -> Duration {
        Duration::from_secs(self.remediation_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}
