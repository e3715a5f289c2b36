//! Host descriptors, per-host results and the aggregated coordinator report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use stig_runtime::limits::coordination::MAX_CAPTURED_OUTPUT_BYTES;

// ============================================================================
// ERRORS
// ============================================================================

/// Failures that stop a coordinator run before any host is touched
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Invalid host '{spec}': {reason}")]
    InvalidHost { spec: String, reason: String },

    #[error("No hosts to remediate")]
    NoHosts,

    #[error("Payload {path} is not available: {reason}")]
    PayloadUnavailable { path: String, reason: String },

    #[error("Could not stage remote configuration: {reason}")]
    ConfigStaging { reason: String },
}

impl CoordinatorError {
    pub fn code(&self) -> stig_runtime::Code {
        use stig_runtime::logging::codes::system;
        match self {
            CoordinatorError::InvalidHost { .. } | CoordinatorError::NoHosts => {
                system::CONFIGURATION_INVALID
            }
            _ => stig_runtime::logging::codes::coordination::HOST_FAILED,
        }
    }
}

// ============================================================================
// HOST DESCRIPTOR
// ============================================================================

/// `[user@]host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
}

impl HostDescriptor {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn parse(spec: &str) -> Result<Self, CoordinatorError> {
        let invalid = |reason: &str| CoordinatorError::InvalidHost {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let spec_trimmed = spec.trim();
        let (user, rest) = match spec_trimmed.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user.to_string()), rest),
            Some(_) => return Err(invalid("empty user name")),
            None => (None, spec_trimmed),
        };

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p != 0)
                    .ok_or_else(|| invalid("port must be a number between 1 and 65535"))?;
                (host, Some(port))
            }
            None => (rest, None),
        };

        if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '@') {
            return Err(invalid("host name is empty or malformed"));
        }

        Ok(Self {
            host: host.to_string(),
            user,
            port,
        })
    }

    /// `user@host` or `host`, as handed to ssh-style tools
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

impl FromStr for HostDescriptor {
    type Err = CoordinatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.destination())?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        Ok(())
    }
}

// ============================================================================
// PER-HOST RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostFailureKind {
    Connect,
    Elevation,
    Delivery,
    Timeout,
    Execution,
    /// The payload ran and reported a failed remediation
    NonZeroExit,
    Cancelled,
    Panicked,
}

impl fmt::Display for HostFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostFailureKind::Connect => "connect",
            HostFailureKind::Elevation => "elevation",
            HostFailureKind::Delivery => "delivery",
            HostFailureKind::Timeout => "timeout",
            HostFailureKind::Execution => "execution",
            HostFailureKind::NonZeroExit => "non-zero exit",
            HostFailureKind::Cancelled => "cancelled",
            HostFailureKind::Panicked => "panicked",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostExecutionResult {
    pub host: String,
    pub success: bool,
    pub errors: Vec<String>,
    /// Combined remote stdout and stderr, truncated
    pub output: String,
    pub exit_code: Option<i32>,
    pub failure: Option<HostFailureKind>,
    pub duration_ms: u64,
}

impl HostExecutionResult {
    pub(crate) fn succeeded(host: &str, output: String, duration: Duration) -> Self {
        Self {
            host: host.to_string(),
            success: true,
            errors: Vec::new(),
            output,
            exit_code: Some(0),
            failure: None,
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub(crate) fn failed(
        host: &str,
        kind: HostFailureKind,
        error: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            host: host.to_string(),
            success: false,
            errors: vec![error.into()],
            output: String::new(),
            exit_code: None,
            failure: Some(kind),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub(crate) fn cancelled(host: &str) -> Self {
        Self::failed(
            host,
            HostFailureKind::Cancelled,
            "not started: coordinator run was cancelled",
            Duration::ZERO,
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.failure == Some(HostFailureKind::Timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure == Some(HostFailureKind::Cancelled)
    }
}

/// Join stdout and stderr and cap the result at the capture ceiling
pub(crate) fn capture_output(stdout: &str, stderr: &str) -> String {
    let mut combined = stdout.trim_end().to_string();
    if !stderr.trim().is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(stderr.trim_end());
    }
    truncate_at_boundary(combined, MAX_CAPTURED_OUTPUT_BYTES)
}

fn truncate_at_boundary(mut text: String, limit: usize) -> String {
    if text.len() <= limit {
        return text;
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str("\n[output truncated]");
    text
}

// ============================================================================
// SERIAL POLICY
// ============================================================================

/// What a serial run does after a host fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDecision {
    Continue,
    Abort,
}

// ============================================================================
// AGGREGATED REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiHostReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub parallel: bool,
    pub workers: usize,
    /// Completion order in parallel mode, host order in serial mode
    pub results: Vec<HostExecutionResult>,
}

impl MultiHostReport {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn cancelled(&self) -> usize {
        self.results.iter().filter(|r| r.is_cancelled()).count()
    }

    /// Hosts that were attempted and failed
    pub fn failed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.success && !r.is_cancelled())
            .count()
    }

    pub fn all_succeeded(&self) -> bool {
        !self.results.is_empty() && self.succeeded() == self.results.len()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            0.0
        } else {
            self.succeeded() as f64 / self.results.len() as f64 * 100.0
        }
    }

    pub fn result_for(&self, host: &str) -> Option<&HostExecutionResult> {
        self.results.iter().find(|r| r.host == host)
    }

    pub fn summary(&self) -> String {
        format!(
            "{} hosts: {} succeeded, {} failed, {} cancelled ({:.1}% success)",
            self.results.len(),
            self.succeeded(),
            self.failed(),
            self.cancelled(),
            self.success_rate()
        )
    }

    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_host_descriptor_parsing() {
        let full = HostDescriptor::parse("admin@web01.example.com:2222").unwrap();
        assert_eq!(full.user.as_deref(), Some("admin"));
        assert_eq!(full.host, "web01.example.com");
        assert_eq!(full.port, Some(2222));
        assert_eq!(full.to_string(), "admin@web01.example.com:2222");
        assert_eq!(full.destination(), "admin@web01.example.com");

        let bare: HostDescriptor = "10.0.0.5".parse().unwrap();
        assert_eq!(bare, HostDescriptor::new("10.0.0.5"));

        assert_matches!(HostDescriptor::parse("@host"), Err(CoordinatorError::InvalidHost { .. }));
        assert_matches!(HostDescriptor::parse("host:0"), Err(CoordinatorError::InvalidHost { .. }));
        assert_matches!(HostDescriptor::parse("host:ssh"), Err(CoordinatorError::InvalidHost { .. }));
        assert_matches!(HostDescriptor::parse("  "), Err(CoordinatorError::InvalidHost { .. }));
    }

    #[test]
    fn test_output_capture_is_bounded() {
        let big = "é".repeat(MAX_CAPTURED_OUTPUT_BYTES);
        let captured = capture_output(&big, "");
        assert!(captured.len() <= MAX_CAPTURED_OUTPUT_BYTES + 20);
        assert!(captured.ends_with("[output truncated]"));

        assert_eq!(capture_output("out\n", "err\n"), "out\nerr");
        assert_eq!(capture_output("", "err"), "err");
    }

    #[test]
    fn test_report_counts() {
        let report = MultiHostReport {
            run_id: "r".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            parallel: true,
            workers: 2,
            results: vec![
                HostExecutionResult::succeeded("a", String::new(), Duration::from_millis(5)),
                HostExecutionResult::failed("b", HostFailureKind::Timeout, "timed out", Duration::ZERO),
                HostExecutionResult::cancelled("c"),
                HostExecutionResult::succeeded("d", String::new(), Duration::ZERO),
            ],
        };

        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 1);
        assert!((report.success_rate() - 50.0).abs() < f64::EPSILON);
        assert!(report.result_for("b").unwrap().is_timeout());
        assert!(!report.all_succeeded());
        assert_eq!(
            report.summary(),
            "4 hosts: 2 succeeded, 1 failed, 1 cancelled (50.0% success)"
        );
    }
}
