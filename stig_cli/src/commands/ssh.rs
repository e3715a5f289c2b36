//! SSH client runner configuration

use stig_engine::transport::ProcessRunner;
use stig_runtime::limits::execution::DEFAULT_COMMAND_TIMEOUT_SECS;
use std::time::Duration;

/// Environment the ssh client needs to find keys and the agent
pub const SSH_PRESERVED_ENV: &[&str] = &["HOME", "USER", "SSH_AUTH_SOCK"];

/// Create a runner that may only start the OpenSSH client tools
///
/// The child environment is cleared apart from `SSH_PRESERVED_ENV`, so
/// agent forwarding and `~/.ssh` lookups keep working.
pub fn create_ssh_runner() -> ProcessRunner {
    let mut runner = ProcessRunner::with_timeout(Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS));

    runner.allow_commands(&[
        "ssh", // Remote execution
        "scp", // File delivery
    ]);
    runner.preserve_env(SSH_PRESERVED_ENV);

    runner
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ssh_runner_allowlist() {
        let runner = create_ssh_runner();

        assert!(runner.is_allowed("ssh"));
        assert!(runner.is_allowed("scp"));

        assert!(!runner.is_allowed("sftp"));
        assert!(!runner.is_allowed("bash"));
        assert!(!runner.is_allowed("sysctl"));
    }
}
