//! Command execution and file delivery on a target machine
//!
//! Everything the engine does to a host goes through a [`Transport`]. The
//! engine itself runs on the target, so it normally uses [`LocalTransport`];
//! the coordinator drives remote hosts through transports built by a
//! [`TransportFactory`].

pub mod local;
pub mod outcome;
pub mod redact;
pub mod scripted;

use std::fmt;
use std::path::Path;
use std::time::Duration;

pub use local::{create_remediation_runner, LocalTransport, ProcessRunner};
pub use outcome::{ArtifactClass, CommandVerdict};
pub use redact::{Redactor, Secret};
pub use scripted::{CallKind, ScriptedCall, ScriptedResponse, ScriptedTransport};

// ============================================================================
// COMMAND LINE
// ============================================================================

/// A program and its arguments, kept unsplit until execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Render for a remote shell, quoting every word that needs it
    pub fn to_shell_string(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|word| shell_quote(word))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_shell_string())
    }
}

/// POSIX single-quote a word unless it only contains safe characters
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+".contains(c));

    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

// ============================================================================
// EXECUTION OPTIONS AND OUTPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run with elevated privileges (sudo) when the session is not already root
    pub elevate: bool,
    pub timeout: Duration,
}

impl ExecOptions {
    pub fn new(timeout: Duration) -> Self {
        Self {
            elevate: false,
            timeout,
        }
    }

    pub fn elevated(timeout: Duration) -> Self {
        Self {
            elevate: true,
            timeout,
        }
    }
}

/// Command execution output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Transport errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("Execution failed for '{program}': {reason}")]
    ExecutionFailed { program: String, reason: String },

    #[error("Command '{command}' timed out after {timeout_ms}ms")]
    Timeout { command: String, timeout_ms: u64 },

    #[error("Permission denied: {program}")]
    PermissionDenied { program: String },

    #[error("Security violation: {reason}")]
    SecurityViolation { reason: String },

    #[error("Connection to {target} failed: {reason}")]
    ConnectFailed { target: String, reason: String },

    #[error("Delivery of {local} to {target}:{remote} failed: {reason}")]
    DeliveryFailed {
        target: String,
        local: String,
        remote: String,
        reason: String,
    },

    #[error("Privilege elevation on {target} refused: {reason}")]
    ElevationDenied { target: String, reason: String },

    #[error("Not connected to {target}")]
    NotConnected { target: String },
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }

    /// Errors after which nothing else can be attempted on the host
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectFailed { .. } | TransportError::NotConnected { .. }
        )
    }

    pub fn code(&self) -> stig_runtime::Code {
        use stig_runtime::logging::codes::transport;
        match self {
            TransportError::Timeout { .. } => transport::TIMEOUT,
            TransportError::ConnectFailed { .. } | TransportError::NotConnected { .. } => {
                transport::CONNECT_FAILED
            }
            TransportError::DeliveryFailed { .. } => transport::DELIVERY_FAILED,
            TransportError::ElevationDenied { .. } => transport::ELEVATION_DENIED,
            TransportError::SecurityViolation { .. } => transport::SECURITY_VIOLATION,
            _ => transport::EXECUTION_FAILED,
        }
    }
}

// ============================================================================
// TRANSPORT TRAITS
// ============================================================================

/// Executes commands on, and delivers files to, one target machine
pub trait Transport: Send {
    /// Human-readable target identity, used in logs and results
    fn target(&self) -> &str;

    /// Establish the session. Local transports have nothing to do.
    fn connect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    /// Execute a command. A non-zero exit is returned as output, not an error.
    fn execute(
        &self,
        command: &CommandLine,
        options: ExecOptions,
    ) -> Result<CommandOutput, TransportError>;

    /// Copy a local file to a path on the target
    fn put_file(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Release the session. Must be safe to call more than once.
    fn disconnect(&mut self) {}
}

/// Builds one transport per host for the coordinator
pub trait TransportFactory: Send + Sync {
    fn create(
        &self,
        host: &crate::coordinator::HostDescriptor,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Confirm that elevated commands really run as root on the target
pub fn verify_elevation(transport: &dyn Transport, timeout: Duration) -> Result<(), TransportError> {
    let output = transport.execute(&CommandLine::new("whoami"), ExecOptions::elevated(timeout))?;

    if output.success() && output.stdout_trimmed() == "root" {
        Ok(())
    } else {
        Err(TransportError::ElevationDenied {
            target: transport.target().to_string(),
            reason: if output.stderr.trim().is_empty() {
                format!("elevated identity is '{}'", output.stdout_trimmed())
            } else {
                output.stderr.trim().to_string()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quoting() {
        let cmd = CommandLine::new("sysctl").arg("-w").arg("kernel.kptr_restrict=2");
        assert_eq!(cmd.to_shell_string(), "sysctl -w kernel.kptr_restrict=2");

        let cmd = CommandLine::new("sh").arg("-c").arg("echo it's here");
        assert_eq!(cmd.to_shell_string(), r"sh -c 'echo it'\''s here'");

        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_verify_elevation() {
        let transport = ScriptedTransport::new("h1")
            .respond("whoami", ScriptedResponse::stdout("root\n"));
        assert!(verify_elevation(&transport, Duration::from_secs(5)).is_ok());

        let transport = ScriptedTransport::new("h2")
            .respond("whoami", ScriptedResponse::stdout("deploy\n"));
        let err = verify_elevation(&transport, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, TransportError::ElevationDenied { .. }));
        assert!(transport.calls()[0].elevated);
    }

    #[test]
    fn test_error_classification() {
        let err = TransportError::Timeout {
            command: "run".into(),
            timeout_ms: 10,
        };
        assert!(err.is_timeout());
        assert_eq!(err.code(), stig_runtime::logging::codes::transport::TIMEOUT);
        assert!(TransportError::NotConnected { target: "h".into() }.is_session_fatal());
    }
}
