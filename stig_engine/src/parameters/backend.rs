//! Where parameter values live
//!
//! The manager only sees [`ParameterBackend`]. Kernel parameters are read and
//! written with `sysctl` over a [`Transport`]; tests use [`MemoryBackend`].

use super::error::ParameterError;
use super::render::parse_assignments;
use super::spec::LiveProbe;
use crate::transport::{ArtifactClass, CommandLine, CommandVerdict, ExecOptions, Transport};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub trait ParameterBackend {
    fn read(&self, name: &str) -> Result<String, ParameterError>;

    fn write(&self, name: &str, value: &str) -> Result<(), ParameterError>;

    /// Load a persisted store into the live system
    fn reload(&self, store: &Path) -> Result<(), ParameterError>;

    /// `None` when the probe cannot be evaluated
    fn probe(&self, probe: LiveProbe) -> Option<bool>;
}

impl<T: ParameterBackend + ?Sized> ParameterBackend for &T {
    fn read(&self, name: &str) -> Result<String, ParameterError> {
        (**self).read(name)
    }

    fn write(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        (**self).write(name, value)
    }

    fn reload(&self, store: &Path) -> Result<(), ParameterError> {
        (**self).reload(store)
    }

    fn probe(&self, probe: LiveProbe) -> Option<bool> {
        (**self).probe(probe)
    }
}

// ============================================================================
// SYSCTL
// ============================================================================

pub struct SysctlBackend<'a> {
    transport: &'a dyn Transport,
    timeout: Duration,
}

impl<'a> SysctlBackend<'a> {
    pub fn new(transport: &'a dyn Transport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    fn run(&self, command: CommandLine, elevate: bool) -> Result<crate::transport::CommandOutput, String> {
        let options = if elevate {
            ExecOptions::elevated(self.timeout)
        } else {
            ExecOptions::new(self.timeout)
        };
        self.transport.execute(&command, options).map_err(|e| e.to_string())
    }
}

impl ParameterBackend for SysctlBackend<'_> {
    fn read(&self, name: &str) -> Result<String, ParameterError> {
        let output = self
            .run(CommandLine::new("sysctl").args(["-n", name]), false)
            .map_err(|reason| ParameterError::ReadFailed {
                name: name.to_string(),
                reason,
            })?;

        if output.success() {
            Ok(output.stdout_trimmed().to_string())
        } else {
            Err(ParameterError::ReadFailed {
                name: name.to_string(),
                reason: format!("parameter does not exist or cannot be read: {}", output.stderr.trim()),
            })
        }
    }

    fn write(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        let fail = |reason: String| ParameterError::WriteFailed {
            name: name.to_string(),
            value: value.to_string(),
            reason,
        };
        let output = self
            .run(CommandLine::new("sysctl").arg("-w").arg(format!("{}={}", name, value)), true)
            .map_err(fail)?;

        if output.success() {
            Ok(())
        } else {
            Err(fail(output.stderr.trim().to_string()))
        }
    }

    fn reload(&self, store: &Path) -> Result<(), ParameterError> {
        let path = store.to_string_lossy().to_string();
        let fail = |reason: String| ParameterError::ReloadFailed {
            path: store.to_path_buf(),
            reason,
        };
        let output = self
            .run(CommandLine::new("sysctl").args(["-p", path.as_str()]), true)
            .map_err(fail)?;

        match ArtifactClass::KernelParameters.classify(&output) {
            CommandVerdict::Failure(reason) => Err(fail(reason)),
            _ => Ok(()),
        }
    }

    fn probe(&self, probe: LiveProbe) -> Option<bool> {
        let command = match probe {
            LiveProbe::DefaultRoute => CommandLine::new("ip").args(["route", "show"]),
            LiveProbe::Ipv6Routes => CommandLine::new("ip").args(["-6", "route", "show"]),
        };
        let output = self.run(command, false).ok().filter(|o| o.success())?;

        Some(match probe {
            LiveProbe::DefaultRoute => output.stdout.contains("default via"),
            LiveProbe::Ipv6Routes => !output.stdout.trim().is_empty(),
        })
    }
}

// ============================================================================
// MEMORY
// ============================================================================

/// In-memory backend for exercising the manager without a kernel
///
/// Names never set are unreadable. `reload` applies the store file and fails
/// on names the backend does not know.
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    values: BTreeMap<String, String>,
    rejected: BTreeSet<String>,
    probes: BTreeMap<String, bool>,
    fail_reload: bool,
    writes: Vec<(String, String)>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(self, name: &str, value: &str) -> Self {
        self.set(name, value);
        self
    }

    /// Writes to `name` fail
    pub fn rejecting(self, name: &str) -> Self {
        self.lock().rejected.insert(name.to_string());
        self
    }

    pub fn failing_reload(self) -> Self {
        self.lock().fail_reload = true;
        self
    }

    pub fn with_probe(self, probe: LiveProbe, result: bool) -> Self {
        self.lock().probes.insert(format!("{:?}", probe), result);
        self
    }

    pub fn set(&self, name: &str, value: &str) {
        self.lock().values.insert(name.to_string(), value.to_string());
    }

    pub fn value(&self, name: &str) -> Option<String> {
        self.lock().values.get(name).cloned()
    }

    /// Successful writes in order
    pub fn writes(&self) -> Vec<(String, String)> {
        self.lock().writes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ParameterBackend for MemoryBackend {
    fn read(&self, name: &str) -> Result<String, ParameterError> {
        self.value(name).ok_or_else(|| ParameterError::ReadFailed {
            name: name.to_string(),
            reason: "unknown key".to_string(),
        })
    }

    fn write(&self, name: &str, value: &str) -> Result<(), ParameterError> {
        let mut state = self.lock();
        if state.rejected.contains(name) {
            return Err(ParameterError::WriteFailed {
                name: name.to_string(),
                value: value.to_string(),
                reason: "permission denied".to_string(),
            });
        }
        state.values.insert(name.to_string(), value.to_string());
        state.writes.push((name.to_string(), value.to_string()));
        Ok(())
    }

    fn reload(&self, store: &Path) -> Result<(), ParameterError> {
        let fail = |reason: String| ParameterError::ReloadFailed {
            path: store.to_path_buf(),
            reason,
        };
        if self.lock().fail_reload {
            return Err(fail("reload rejected".to_string()));
        }

        let text = std::fs::read_to_string(store).map_err(|e| fail(e.to_string()))?;
        let mut state = self.lock();
        for (name, value) in parse_assignments(&text) {
            if state.rejected.contains(&name) {
                return Err(fail(format!("permission denied on key '{}'", name)));
            }
            state.values.insert(name, value);
        }
        Ok(())
    }

    fn probe(&self, probe: LiveProbe) -> Option<bool> {
        self.lock().probes.get(&format!("{:?}", probe)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    #[test]
    fn test_sysctl_commands() {
        let transport = ScriptedTransport::new("h")
            .respond("sysctl -n net.ipv4.ip_forward", ScriptedResponse::stdout("1\n"))
            .respond(
                "sysctl -n kernel.unknown",
                ScriptedResponse::exit(255, "", "sysctl: cannot stat /proc/sys/kernel/unknown"),
            )
            .respond("ip route show", ScriptedResponse::stdout("default via 10.0.0.1 dev eth0\n"))
            .respond("ip -6 route show", ScriptedResponse::stdout(""));
        let backend = SysctlBackend::new(&transport, Duration::from_secs(5));

        assert_eq!(backend.read("net.ipv4.ip_forward").unwrap(), "1");
        assert!(matches!(
            backend.read("kernel.unknown"),
            Err(ParameterError::ReadFailed { .. })
        ));
        backend.write("net.ipv4.ip_forward", "0").unwrap();
        assert_eq!(backend.probe(LiveProbe::DefaultRoute), Some(true));
        assert_eq!(backend.probe(LiveProbe::Ipv6Routes), Some(false));

        let calls = transport.calls();
        let write = calls
            .iter()
            .find(|c| c.detail == "sysctl -w net.ipv4.ip_forward=0")
            .unwrap();
        assert!(write.elevated);
    }

    #[test]
    fn test_reload_tolerates_missing_keys() {
        let transport = ScriptedTransport::new("h").respond(
            "sysctl -p",
            ScriptedResponse::exit(255, "", "sysctl: cannot stat /proc/sys/net/ipv6/conf/all/forwarding: No such file"),
        );
        let backend = SysctlBackend::new(&transport, Duration::from_secs(5));
        assert!(backend.reload(Path::new("/etc/sysctl.d/99-stig-remediation.conf")).is_ok());

        let transport = ScriptedTransport::new("h")
            .respond("sysctl -p", ScriptedResponse::exit(1, "", "sysctl: permission denied"));
        let backend = SysctlBackend::new(&transport, Duration::from_secs(5));
        assert!(backend.reload(Path::new("/etc/sysctl.d/x.conf")).is_err());
    }

    #[test]
    fn test_memory_backend_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store.conf");
        std::fs::write(&store, "# header\nkernel.kptr_restrict = 2\n").unwrap();

        let backend = MemoryBackend::new().with_value("kernel.kptr_restrict", "0");
        backend.reload(&store).unwrap();
        assert_eq!(backend.value("kernel.kptr_restrict").as_deref(), Some("2"));
        assert!(backend.writes().is_empty());
    }
}
