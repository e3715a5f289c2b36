//! Standard pre-flight checks

use super::{CheckContext, CheckResult, PreflightCheck};
use crate::transport::{CommandLine, ExecOptions};
use std::path::Path;

fn run_plain(ctx: &CheckContext<'_>, command: CommandLine) -> Option<crate::transport::CommandOutput> {
    ctx.transport
        .execute(&command, ExecOptions::new(ctx.timeout))
        .ok()
}

/// Effective user must be root
pub struct PrivilegeCheck;

impl PreflightCheck for PrivilegeCheck {
    fn name(&self) -> &'static str {
        "privilege"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match run_plain(ctx, CommandLine::new("id").arg("-u")) {
            Some(out) if out.success() && out.stdout_trimmed() == "0" => {
                CheckResult::pass(self.name(), "Running as root")
            }
            Some(out) if out.success() => CheckResult::fail(
                self.name(),
                format!("Must run as root (uid {})", out.stdout_trimmed()),
            ),
            _ => CheckResult::fail(self.name(), "Could not determine effective uid"),
        }
    }
}

/// The os-release file must name the expected distribution and version
pub struct OsVersionCheck;

impl PreflightCheck for OsVersionCheck {
    fn name(&self) -> &'static str {
        "os_version"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let expected = &ctx.settings.expected_os;
        let content = match std::fs::read_to_string(&ctx.settings.os_release_path) {
            Ok(content) => content,
            Err(e) if ctx.override_os => {
                return CheckResult::advisory(
                    self.name(),
                    format!("Cannot read os-release ({}); OS override active", e),
                )
            }
            Err(e) => {
                return CheckResult::fail(
                    self.name(),
                    format!("Cannot read {}: {}", ctx.settings.os_release_path.display(), e),
                )
            }
        };

        if content.contains(expected.as_str()) {
            CheckResult::pass(self.name(), format!("{} detected", expected))
        } else if ctx.override_os {
            CheckResult::advisory(
                self.name(),
                format!("Operating system is not {}; OS override active", expected),
            )
        } else {
            CheckResult::fail(self.name(), format!("Operating system is not {}", expected))
        }
    }
}

/// Free space on the root filesystem must meet the floor
pub struct DiskSpaceCheck;

impl DiskSpaceCheck {
    /// Available megabytes from `df -Pm` output
    pub fn parse_available_mb(df_output: &str) -> Option<u64> {
        df_output
            .lines()
            .nth(1)
            .and_then(|line| line.split_whitespace().nth(3))
            .and_then(|avail| avail.parse().ok())
    }
}

impl PreflightCheck for DiskSpaceCheck {
    fn name(&self) -> &'static str {
        "disk_space"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let path = ctx.settings.free_space_path.to_string_lossy().to_string();
        let floor = ctx.settings.min_free_space_mb;

        let available = run_plain(ctx, CommandLine::new("df").args(["-Pm", path.as_str()]))
            .filter(|out| out.success())
            .and_then(|out| Self::parse_available_mb(&out.stdout));

        match available {
            Some(mb) if mb >= floor => {
                CheckResult::pass(self.name(), format!("{} MB free on {}", mb, path))
            }
            Some(mb) => CheckResult::fail(
                self.name(),
                format!("Only {} MB free on {}, {} MB required", mb, path, floor),
            ),
            None => CheckResult::fail(self.name(), format!("Could not measure free space on {}", path)),
        }
    }
}

/// The service manager must be running or degraded, not failed
pub struct ServiceHealthCheck;

impl PreflightCheck for ServiceHealthCheck {
    fn name(&self) -> &'static str {
        "service_health"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        match run_plain(ctx, CommandLine::new("systemctl").arg("is-system-running")) {
            Some(out) if out.exit_code == 0 || out.exit_code == 1 => CheckResult::pass(
                self.name(),
                format!("System state: {}", out.stdout_trimmed()),
            ),
            Some(out) => CheckResult::fail(
                self.name(),
                format!("System state unhealthy: {}", out.stdout_trimmed()),
            ),
            None => CheckResult::fail(self.name(), "Could not query system state"),
        }
    }
}

/// Name resolution, or at least an ICMP echo when DNS is down
pub struct NetworkCheck;

impl PreflightCheck for NetworkCheck {
    fn name(&self) -> &'static str {
        "network"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let dns = run_plain(ctx, CommandLine::new("host").arg(ctx.settings.dns_probe_host.as_str()));
        if dns.map(|o| o.success()).unwrap_or(false) {
            return CheckResult::pass(self.name(), "DNS resolution working");
        }

        let ping = run_plain(
            ctx,
            CommandLine::new("ping").args(["-c", "1", "-W", "2", ctx.settings.ping_probe_address.as_str()]),
        );
        if ping.map(|o| o.success()).unwrap_or(false) {
            return CheckResult::pass(self.name(), "Network reachable, DNS not resolving");
        }

        CheckResult::fail(self.name(), "Cannot resolve DNS or ping external hosts")
    }
}

/// The backup directory must accept writes
pub struct BackupStorageCheck;

impl PreflightCheck for BackupStorageCheck {
    fn name(&self) -> &'static str {
        "backup_storage"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let dir = &ctx.settings.backup_dir;
        let probe = dir.join(".write_test");

        let outcome = std::fs::create_dir_all(dir)
            .and_then(|_| std::fs::write(&probe, b"test"))
            .and_then(|_| std::fs::remove_file(&probe));

        match outcome {
            Ok(()) => CheckResult::pass(self.name(), format!("{} is writable", dir.display())),
            Err(e) => CheckResult::fail(self.name(), format!("{} is not writable: {}", dir.display(), e)),
        }
    }
}

/// Warns when running over SSH, since sshd changes may end the session
pub struct InteractiveSessionCheck {
    variables: Vec<String>,
}

impl Default for InteractiveSessionCheck {
    fn default() -> Self {
        Self::with_variables(&["SSH_CONNECTION", "SSH_CLIENT"])
    }
}

impl InteractiveSessionCheck {
    pub fn with_variables(variables: &[&str]) -> Self {
        Self {
            variables: variables.iter().map(|v| v.to_string()).collect(),
        }
    }
}

impl PreflightCheck for InteractiveSessionCheck {
    fn name(&self) -> &'static str {
        "interactive_session"
    }

    fn run(&self, _ctx: &CheckContext<'_>) -> CheckResult {
        let remote = self.variables.iter().any(|v| std::env::var_os(v).is_some());
        if remote {
            CheckResult::advisory(
                self.name(),
                "Running over SSH; keep a second session open in case SSH settings lock you out",
            )
        } else {
            CheckResult::pass(self.name(), "Console session")
        }
    }
}

/// Looks for LVM snapshots or a virtualized host
pub struct SnapshotAvailabilityCheck;

impl PreflightCheck for SnapshotAvailabilityCheck {
    fn name(&self) -> &'static str {
        "snapshot_availability"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let lvs = run_plain(
            ctx,
            CommandLine::new("lvs").args(["--noheadings", "-o", "lv_name"]),
        );
        if let Some(out) = lvs.filter(|o| o.success()) {
            if out.stdout.contains("snap") {
                return CheckResult::pass(self.name(), "LVM snapshot present");
            }
        }

        if let Some(marker) = ctx.settings.virtualization_markers.iter().find(|m| m.exists()) {
            return CheckResult::advisory(
                self.name(),
                format!(
                    "Virtualized host ({}); take a hypervisor snapshot before continuing",
                    marker.display()
                ),
            );
        }

        if ctx.snapshot_required {
            CheckResult::fail(self.name(), "No system snapshot available and one is required")
        } else {
            CheckResult::advisory(self.name(), "No system snapshot detected")
        }
    }
}

/// Files the controls modify must exist beforehand
pub struct CriticalFilesCheck;

impl PreflightCheck for CriticalFilesCheck {
    fn name(&self) -> &'static str {
        "critical_files"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let missing: Vec<String> = ctx
            .settings
            .critical_files
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();

        if missing.is_empty() {
            CheckResult::pass(
                self.name(),
                format!("{} critical files present", ctx.settings.critical_files.len()),
            )
        } else {
            CheckResult::fail(self.name(), format!("Missing critical files: {}", missing.join(", ")))
        }
    }
}

/// No package manager may be holding its locks
pub struct PackageLockCheck;

impl PackageLockCheck {
    fn is_held(ctx: &CheckContext<'_>, lock: &Path) -> Result<bool, String> {
        let lock = lock.to_string_lossy().to_string();
        let probe = CommandLine::new("flock").args(["-n", lock.as_str(), "true"]);
        ctx.transport
            .execute(&probe, ExecOptions::new(ctx.timeout))
            .map(|out| !out.success())
            .map_err(|e| e.to_string())
    }
}

impl PreflightCheck for PackageLockCheck {
    fn name(&self) -> &'static str {
        "package_locks"
    }

    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult {
        let mut held = Vec::new();
        for lock in ctx.settings.lock_files.iter().filter(|lock| lock.exists()) {
            match Self::is_held(ctx, lock) {
                Ok(true) => held.push(lock.display().to_string()),
                Ok(false) => {}
                Err(reason) => {
                    return CheckResult::fail(
                        self.name(),
                        format!("Could not check package lock {}: {}", lock.display(), reason),
                    )
                }
            }
        }

        if held.is_empty() {
            CheckResult::pass(self.name(), "Package manager is idle")
        } else {
            CheckResult::fail(self.name(), format!("Package manager lock held: {}", held.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PreflightSettings;
    use crate::transport::{ScriptedResponse, ScriptedTransport, TransportError};
    use std::path::PathBuf;
    use std::time::Duration;

    fn ctx<'a>(
        transport: &'a ScriptedTransport,
        settings: &'a PreflightSettings,
        override_os: bool,
        snapshot_required: bool,
    ) -> CheckContext<'a> {
        CheckContext {
            transport,
            settings,
            override_os,
            snapshot_required,
            timeout: Duration::from_secs(5),
        }
    }

    fn isolated_settings(dir: &Path) -> PreflightSettings {
        PreflightSettings {
            os_release_path: dir.join("os-release"),
            backup_dir: dir.join("backups"),
            critical_files: vec![dir.join("sshd_config")],
            lock_files: vec![dir.join("lock")],
            virtualization_markers: vec![dir.join(".dockerenv")],
            ..PreflightSettings::default()
        }
    }

    #[test]
    fn test_privilege() {
        let settings = PreflightSettings::default();
        let t = ScriptedTransport::new("h").respond("id -u", ScriptedResponse::stdout("1000\n"));
        let result = PrivilegeCheck.run(&ctx(&t, &settings, false, false));
        assert!(!result.passed);
        assert!(result.message.contains("1000"));
    }

    #[test]
    fn test_os_version_and_override() {
        let dir = tempfile::tempdir().unwrap();
        let settings = isolated_settings(dir.path());
        let t = ScriptedTransport::new("h");

        std::fs::write(&settings.os_release_path, "PRETTY_NAME=\"Ubuntu 20.04.6 LTS\"\n").unwrap();
        assert!(OsVersionCheck.run(&ctx(&t, &settings, false, false)).passed);

        std::fs::write(&settings.os_release_path, "PRETTY_NAME=\"Debian 12\"\n").unwrap();
        assert!(!OsVersionCheck.run(&ctx(&t, &settings, false, false)).passed);

        let overridden = OsVersionCheck.run(&ctx(&t, &settings, true, false));
        assert!(overridden.passed);
        assert_eq!(overridden.warnings.len(), 1);
    }

    #[test]
    fn test_disk_space() {
        let df = "Filesystem 1048576-blocks Used Available Capacity Mounted on\n/dev/sda1 40000 39800 200 99% /\n";
        assert_eq!(DiskSpaceCheck::parse_available_mb(df), Some(200));

        let settings = PreflightSettings::default();
        let t = ScriptedTransport::new("h").respond("df", ScriptedResponse::stdout(df));
        let result = DiskSpaceCheck.run(&ctx(&t, &settings, false, false));
        assert!(!result.passed);
        assert!(result.message.contains("500 MB required"));
    }

    #[test]
    fn test_service_health_accepts_degraded() {
        let settings = PreflightSettings::default();
        let t = ScriptedTransport::new("h")
            .respond("systemctl is-system-running", ScriptedResponse::exit(1, "degraded\n", ""));
        assert!(ServiceHealthCheck.run(&ctx(&t, &settings, false, false)).passed);

        let t = ScriptedTransport::new("h")
            .respond("systemctl is-system-running", ScriptedResponse::exit(3, "maintenance\n", ""));
        assert!(!ServiceHealthCheck.run(&ctx(&t, &settings, false, false)).passed);
    }

    #[test]
    fn test_network_fallbacks() {
        let settings = PreflightSettings::default();
        let t = ScriptedTransport::new("h")
            .respond("host", ScriptedResponse::exit(1, "", "not found"))
            .respond("ping", ScriptedResponse::ok());
        let result = NetworkCheck.run(&ctx(&t, &settings, false, false));
        assert!(result.passed && result.warnings.is_empty());
        assert_eq!(t.executed().len(), 2);

        let t = ScriptedTransport::new("h")
            .respond("host", ScriptedResponse::exit(1, "", ""))
            .respond("ping", ScriptedResponse::Error(TransportError::ProgramNotFound { program: "ping".into() }));
        let result = NetworkCheck.run(&ctx(&t, &settings, false, false));
        assert!(!result.passed);
        assert!(result.message.contains("Cannot resolve DNS"));

        let t = ScriptedTransport::new("h")
            .respond("host", ScriptedResponse::exit(1, "", ""))
            .respond("ping", ScriptedResponse::exit(1, "", "100% packet loss"));
        assert!(!NetworkCheck.run(&ctx(&t, &settings, false, false)).passed);
    }

    #[test]
    fn test_backup_storage_and_critical_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = isolated_settings(dir.path());
        let t = ScriptedTransport::new("h");

        assert!(BackupStorageCheck.run(&ctx(&t, &settings, false, false)).passed);
        assert!(!settings.backup_dir.join(".write_test").exists());

        assert!(!CriticalFilesCheck.run(&ctx(&t, &settings, false, false)).passed);
        std::fs::write(dir.path().join("sshd_config"), "").unwrap();
        assert!(CriticalFilesCheck.run(&ctx(&t, &settings, false, false)).passed);
    }

    #[test]
    fn test_snapshot_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let settings = isolated_settings(dir.path());
        let none = ScriptedTransport::new("h").respond("lvs", ScriptedResponse::stdout("  root\n  swap\n"));

        let optional = SnapshotAvailabilityCheck.run(&ctx(&none, &settings, false, false));
        assert!(optional.passed && !optional.warnings.is_empty());
        assert!(!SnapshotAvailabilityCheck.run(&ctx(&none, &settings, false, true)).passed);

        std::fs::write(dir.path().join(".dockerenv"), "").unwrap();
        assert!(SnapshotAvailabilityCheck.run(&ctx(&none, &settings, false, true)).passed);

        let lvm = ScriptedTransport::new("h").respond("lvs", ScriptedResponse::stdout("  root\n  root_snap\n"));
        let result = SnapshotAvailabilityCheck.run(&ctx(&lvm, &settings, false, true));
        assert!(result.passed && result.warnings.is_empty());
    }

    #[test]
    fn test_package_locks() {
        let dir = tempfile::tempdir().unwrap();
        let settings = isolated_settings(dir.path());

        let t = ScriptedTransport::new("h");
        assert!(PackageLockCheck.run(&ctx(&t, &settings, false, false)).passed);
        assert!(t.executed().is_empty());

        std::fs::write(PathBuf::from(&settings.lock_files[0]), "").unwrap();
        let t = ScriptedTransport::new("h").respond("flock", ScriptedResponse::exit(1, "", ""));
        assert!(!PackageLockCheck.run(&ctx(&t, &settings, false, false)).passed);

        let t = ScriptedTransport::new("h")
            .respond("flock", ScriptedResponse::Error(TransportError::ProgramNotFound { program: "flock".into() }));
        let result = PackageLockCheck.run(&ctx(&t, &settings, false, false));
        assert!(!result.passed);
        assert!(result.message.starts_with("Could not check package lock"));
    }
}
