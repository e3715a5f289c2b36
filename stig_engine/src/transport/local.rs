//! Local process execution with an allowlist, a cleared environment and
//! timeout enforcement

use super::{CommandLine, CommandOutput, ExecOptions, Redactor, Secret, Transport, TransportError};
use stig_runtime::limits::execution::{DEFAULT_COMMAND_TIMEOUT_SECS, RESTRICTED_PATH};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

// ============================================================================
// PROCESS RUNNER
// ============================================================================

/// Spawns allowlisted programs and enforces a timeout on each
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    default_timeout: Duration,
    allowed_commands: HashSet<String>,
    preserved_env: Vec<String>,
}

impl ProcessRunner {
    /// Create runner with empty allowlist - must be configured before use
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            default_timeout: timeout,
            allowed_commands: HashSet::new(),
            preserved_env: Vec::new(),
        }
    }

    pub fn allow_command(&mut self, command: impl Into<String>) {
        self.allowed_commands.insert(command.into());
    }

    pub fn allow_commands(&mut self, commands: &[&str]) {
        for cmd in commands {
            self.allowed_commands.insert(cmd.to_string());
        }
    }

    /// Keep these variables when the child environment is cleared
    pub fn preserve_env(&mut self, names: &[&str]) {
        self.preserved_env.extend(names.iter().map(|n| n.to_string()));
    }

    pub fn is_allowed(&self, program: &str) -> bool {
        self.allowed_commands.contains(program)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute a program, optionally feeding `stdin`, and capture its output
    pub fn run(
        &self,
        program: &str,
        args: &[String],
        stdin: Option<&str>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, TransportError> {
        if !self.is_allowed(program) {
            return Err(TransportError::SecurityViolation {
                reason: format!("Command '{}' not in allowlist", program),
            });
        }

        let timeout_duration = timeout.unwrap_or(self.default_timeout);
        let start = Instant::now();

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .env("PATH", RESTRICTED_PATH)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for name in &self.preserved_env {
            if let Ok(value) = std::env::var(name) {
                cmd.env(name, value);
            }
        }

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::ProgramNotFound {
                program: program.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => TransportError::PermissionDenied {
                program: program.to_string(),
            },
            _ => TransportError::ExecutionFailed {
                program: program.to_string(),
                reason: e.to_string(),
            },
        })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            // a child that exits without reading stdin is not an error here
            let _ = pipe.write_all(input.as_bytes());
        }

        // drain pipes on their own threads so a chatty child cannot block on a full pipe
        let stdout_reader = spawn_reader(child.stdout.take());
        let stderr_reader = spawn_reader(child.stderr.take());

        let waited =
            wait_timeout::ChildExt::wait_timeout(&mut child, timeout_duration).map_err(|e| {
                TransportError::ExecutionFailed {
                    program: program.to_string(),
                    reason: e.to_string(),
                }
            })?;

        let status = match waited {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                return Err(TransportError::Timeout {
                    command: program.to_string(),
                    timeout_ms: timeout_duration.as_millis() as u64,
                });
            }
        };

        let stdout = stdout_reader.join().unwrap_or_default();
        let stderr = stderr_reader.join().unwrap_or_default();

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            exit_code: status.code().unwrap_or(-1),
            duration: start.elapsed(),
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buffer);
        }
        buffer
    })
}

/// Runner configured for Ubuntu 20.04 remediation
///
/// Allowlist covers the tools used by pre-flight checks, parameter
/// management, post-validation and the bundled control types.
pub fn create_remediation_runner() -> ProcessRunner {
    let mut runner = ProcessRunner::new();

    runner.allow_commands(&[
        "id",             // Privilege check
        "whoami",         // Elevation check
        "sudo",           // Elevation wrapper
        "df",             // Free space
        "systemctl",      // Service manager
        "host",           // DNS reachability
        "ping",           // ICMP reachability
        "lvs",            // LVM snapshot discovery
        "flock",          // Package lock probe
        "ip",             // Routing state for conflict probes
        "sysctl",         // Kernel parameters
        "sshd",           // Daemon config syntax
        "visudo",         // Sudoers syntax
        "update-grub",    // Boot loader regeneration
        "apt-get",        // Package removal/installation
        "dpkg",           // Package state
        "dpkg-query",     // Package queries
        "auditctl",       // Audit rules
        "augenrules",     // Audit rule loading
        "aa-enforce",     // AppArmor profiles
        "ufw",            // Host firewall
        "modprobe",       // Kernel modules
        "chmod",          // Permissions
        "chown",          // Ownership
        "passwd",         // Account locking
        "usermod",        // Account settings
        "chage",          // Password ageing
        "rm",             // Artifact cleanup
        "mkdir",          // Staging directories
    ]);

    runner
}

// ============================================================================
// LOCAL TRANSPORT
// ============================================================================

#[derive(Debug, Clone)]
enum Elevation {
    AlreadyRoot,
    Sudo(Option<Secret>),
}

/// Transport for the machine the engine runs on
pub struct LocalTransport {
    runner: ProcessRunner,
    target: String,
    elevation: Elevation,
    redactor: Redactor,
}

impl LocalTransport {
    pub fn new(runner: ProcessRunner) -> Self {
        let elevation = if crate::identity::current_euid() == Some(0) {
            Elevation::AlreadyRoot
        } else {
            Elevation::Sudo(None)
        };

        Self {
            runner,
            target: "localhost".to_string(),
            elevation,
            redactor: Redactor::new(),
        }
    }

    /// Use `sudo -S` with this secret for elevated commands
    pub fn with_sudo_secret(mut self, secret: Secret) -> Self {
        self.redactor.add(&secret);
        self.elevation = Elevation::Sudo(Some(secret));
        self
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }
}

impl Transport for LocalTransport {
    fn target(&self) -> &str {
        &self.target
    }

    fn execute(
        &self,
        command: &CommandLine,
        options: ExecOptions,
    ) -> Result<CommandOutput, TransportError> {
        if !self.runner.is_allowed(&command.program) {
            return Err(TransportError::SecurityViolation {
                reason: format!("Command '{}' not in allowlist", command.program),
            });
        }

        let timeout = Some(options.timeout);
        let output = match (&self.elevation, options.elevate) {
            (Elevation::Sudo(secret), true) => {
                let mut args: Vec<String> = match secret {
                    Some(_) => vec!["-S".into(), "-p".into(), String::new()],
                    None => vec!["-n".into()],
                };
                args.push(command.program.clone());
                args.extend(command.args.iter().cloned());

                let input = secret.as_ref().map(|s| format!("{}\n", s.expose()));
                let mut sudo = self.runner.clone();
                sudo.allow_command("sudo");
                sudo.run("sudo", &args, input.as_deref(), timeout)?
            }
            _ => self.runner.run(&command.program, &command.args, None, timeout)?,
        };

        Ok(CommandOutput {
            stdout: self.redactor.redact(&output.stdout),
            stderr: self.redactor.redact(&output.stderr),
            ..output
        })
    }

    fn put_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let fail = |reason: String| TransportError::DeliveryFailed {
            target: self.target.clone(),
            local: local.display().to_string(),
            remote: remote.to_string(),
            reason,
        };

        let destination = Path::new(remote);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
        }
        std::fs::copy(local, destination).map_err(|e| fail(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_allowlist() {
        let runner = ProcessRunner::new();
        assert!(!runner.is_allowed("sysctl"));
    }

    #[test]
    fn test_allowlist_management() {
        let mut runner = ProcessRunner::new();

        runner.allow_command("sysctl");
        assert!(runner.is_allowed("sysctl"));
        assert!(!runner.is_allowed("systemctl"));

        runner.allow_commands(&["systemctl", "visudo"]);
        assert!(runner.is_allowed("systemctl"));
        assert!(runner.is_allowed("visudo"));
    }

    #[test]
    fn test_security_violation() {
        let runner = ProcessRunner::new();
        let result = runner.run("rm", &["-rf".into(), "/".into()], None, None);
        assert!(matches!(result, Err(TransportError::SecurityViolation { .. })));
    }

    #[test]
    fn test_remediation_runner_allowlist() {
        let runner = create_remediation_runner();
        for program in ["sysctl", "systemctl", "visudo", "sshd", "lvs", "flock"] {
            assert!(runner.is_allowed(program), "{} should be allowed", program);
        }
        assert!(!runner.is_allowed("bash"));
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_and_captures_output() {
        let mut runner = ProcessRunner::new();
        runner.allow_command("echo");
        let output = runner
            .run("echo", &["hardened".into()], None, Some(Duration::from_secs(5)))
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout_trimmed(), "hardened");
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let mut runner = ProcessRunner::new();
        runner.allow_command("sleep");
        let result = runner.run("sleep", &["5".into()], None, Some(Duration::from_millis(100)));
        assert!(matches!(result, Err(TransportError::Timeout { timeout_ms: 100, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_stdin_is_fed() {
        let mut runner = ProcessRunner::new();
        runner.allow_command("cat");
        let output = runner
            .run("cat", &[], Some("piped\n"), Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(output.stdout, "piped\n");
    }

    #[test]
    fn test_local_put_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("payload");
        std::fs::write(&source, b"binary").unwrap();
        let destination = dir.path().join("staging/payload");

        let transport = LocalTransport::new(ProcessRunner::new());
        transport
            .put_file(&source, destination.to_str().unwrap())
            .unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"binary");
    }
}
