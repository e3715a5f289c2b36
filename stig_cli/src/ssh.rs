//! SSH transport built on the OpenSSH client binaries
//!
//! Every command is a fresh `ssh` invocation in batch mode, so a session
//! is only a verified reachability check plus the options to reuse.
//! Elevated commands are wrapped in `sudo`; with a secret the password is
//! fed on stdin and scrubbed from captured output.

use std::path::{Path, PathBuf};
use std::time::Duration;
use stig_engine::coordinator::HostDescriptor;
use stig_engine::transport::{
    shell_quote, CommandLine, CommandOutput, ExecOptions, ProcessRunner, Redactor, Secret, Transport,
    TransportError, TransportFactory,
};
use stig_runtime::log_debug;

use crate::commands::create_ssh_runner;

/// ssh exits with 255 when the connection itself failed
const SSH_CONNECTION_ERROR: i32 = 255;

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Accept unknown host keys on first contact
    pub accept_new_host_keys: bool,
    pub sudo_secret: Option<Secret>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            identity_file: None,
            connect_timeout_secs: 10,
            accept_new_host_keys: true,
            sudo_secret: None,
        }
    }
}

impl SshOptions {
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    pub fn with_sudo_secret(mut self, secret: Secret) -> Self {
        self.sudo_secret = Some(secret);
        self
    }

    fn common_args(&self) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        if self.accept_new_host_keys {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=accept-new".to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }
        args
    }
}

pub struct SshTransport {
    host: HostDescriptor,
    target: String,
    options: SshOptions,
    runner: ProcessRunner,
    redactor: Redactor,
    connected: bool,
}

impl SshTransport {
    pub fn new(host: HostDescriptor, options: SshOptions) -> Self {
        let mut redactor = Redactor::new();
        if let Some(secret) = &options.sudo_secret {
            redactor.add(secret);
        }

        Self {
            target: host.to_string(),
            host,
            options,
            runner: create_ssh_runner(),
            redactor,
            connected: false,
        }
    }

    pub(crate) fn ssh_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = self.options.common_args();
        if let Some(port) = self.host.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push(self.host.destination());
        args.push("--".to_string());
        args.push(remote_command.to_string());
        args
    }

    pub(crate) fn scp_args(&self, local: &Path, remote: &str) -> Vec<String> {
        let mut args = self.options.common_args();
        if let Some(port) = self.host.port {
            args.push("-P".to_string());
            args.push(port.to_string());
        }
        args.push(local.display().to_string());
        args.push(format!("{}:{}", self.host.destination(), shell_quote(remote)));
        args
    }

    /// Remote shell form, wrapped in sudo when elevation is requested
    pub(crate) fn remote_command(&self, command: &CommandLine, elevate: bool) -> String {
        let shell = command.to_shell_string();
        if !elevate {
            return shell;
        }
        match &self.options.sudo_secret {
            Some(_) => format!("sudo -S -p '' {}", shell),
            None => format!("sudo -n {}", shell),
        }
    }

    fn connection_error(&self, output: &CommandOutput) -> TransportError {
        TransportError::ConnectFailed {
            target: self.target.clone(),
            reason: self.redactor.redact(output.stderr.trim()),
        }
    }
}

impl Transport for SshTransport {
    fn target(&self) -> &str {
        &self.target
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        let timeout = Duration::from_secs(self.options.connect_timeout_secs.saturating_mul(2).max(1));
        let output = self
            .runner
            .run("ssh", &self.ssh_args("true"), None, Some(timeout))
            .map_err(|e| match e {
                TransportError::Timeout { .. } => e,
                other => TransportError::ConnectFailed {
                    target: self.target.clone(),
                    reason: other.to_string(),
                },
            })?;

        if output.success() {
            log_debug!("SSH session verified", "host" => self.target);
            self.connected = true;
            Ok(())
        } else {
            Err(self.connection_error(&output))
        }
    }

    fn execute(&self, command: &CommandLine, options: ExecOptions) -> Result<CommandOutput, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected {
                target: self.target.clone(),
            });
        }

        let remote = self.remote_command(command, options.elevate);
        let stdin = match (&self.options.sudo_secret, options.elevate) {
            (Some(secret), true) => Some(format!("{}\n", secret.expose())),
            _ => None,
        };

        let output = self
            .runner
            .run("ssh", &self.ssh_args(&remote), stdin.as_deref(), Some(options.timeout))
            .map_err(|e| match e {
                TransportError::Timeout { timeout_ms, .. } => TransportError::Timeout {
                    command: command.to_shell_string(),
                    timeout_ms,
                },
                other => other,
            })?;

        if output.exit_code == SSH_CONNECTION_ERROR {
            return Err(self.connection_error(&output));
        }

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

        if !self.connected {
            return Err(TransportError::NotConnected {
                target: self.target.clone(),
            });
        }

        let output = self
            .runner
            .run("scp", &self.scp_args(local, remote), None, None)
            .map_err(|e| match e {
                TransportError::Timeout { .. } => e,
                other => fail(other.to_string()),
            })?;

        if output.success() {
            Ok(())
        } else {
            Err(fail(self.redactor.redact(output.stderr.trim())))
        }
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

/// One [`SshTransport`] per host, all sharing the same options
pub struct SshTransportFactory {
    options: SshOptions,
}

impl SshTransportFactory {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

impl TransportFactory for SshTransportFactory {
    fn create(&self, host: &HostDescriptor) -> Result<Box<dyn Transport>, TransportError> {
        Ok(Box::new(SshTransport::new(host.clone(), self.options.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn transport(spec: &str, options: SshOptions) -> SshTransport {
        SshTransport::new(HostDescriptor::parse(spec).unwrap(), options)
    }

    #[test]
    fn test_ssh_arguments() {
        let t = transport(
            "admin@web01:2222",
            SshOptions::default().with_identity_file("/root/.ssh/stig_ed25519"),
        );
        let args = t.ssh_args("whoami");

        assert_eq!(
            args,
            vec![
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=10",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-i",
                "/root/.ssh/stig_ed25519",
                "-p",
                "2222",
                "admin@web01",
                "--",
                "whoami",
            ]
        );
    }

    #[test]
    fn test_scp_arguments_use_capital_port_flag() {
        let t = transport("web02:2200", SshOptions::default());
        let args = t.scp_args(Path::new("/tmp/payload"), "/tmp/stig remediate");

        assert!(args.windows(2).any(|w| w == ["-P", "2200"]));
        assert_eq!(args.last().map(String::as_str), Some("web02:'/tmp/stig remediate'"));
    }

    #[test]
    fn test_elevation_wrapping() {
        let cmd = CommandLine::new("sysctl").args(["-w", "kernel.kptr_restrict=2"]);

        let plain = transport("web03", SshOptions::default());
        assert_eq!(plain.remote_command(&cmd, false), "sysctl -w kernel.kptr_restrict=2");
        assert_eq!(plain.remote_command(&cmd, true), "sudo -n sysctl -w kernel.kptr_restrict=2");

        let with_secret = transport("web03", SshOptions::default().with_sudo_secret(Secret::new("hunter2")));
        assert_eq!(
            with_secret.remote_command(&cmd, true),
            "sudo -S -p '' sysctl -w kernel.kptr_restrict=2"
        );
    }

    #[test]
    fn test_commands_require_a_session() {
        let t = transport("web04", SshOptions::default());
        let result = t.execute(
            &CommandLine::new("whoami"),
            ExecOptions::new(Duration::from_secs(1)),
        );
        assert!(matches!(result, Err(TransportError::NotConnected { .. })));

        let delivery = t.put_file(Path::new("/tmp/payload"), "/tmp/payload");
        assert!(matches!(delivery, Err(TransportError::NotConnected { .. })));
    }

    #[test]
    fn test_factory_builds_one_transport_per_host() {
        let factory = SshTransportFactory::new(SshOptions::default());
        let host = HostDescriptor::parse("ops@db01").unwrap();
        let transport = factory.create(&host).unwrap();
        assert_eq!(transport.target(), "ops@db01");
    }
}
