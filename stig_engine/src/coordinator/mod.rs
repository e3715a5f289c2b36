//! # Multi-Host Coordination
//!
//! Runs the remediation payload on many hosts. Each host gets its own
//! transport from a [`TransportFactory`] and goes through the same steps:
//! connect, verify elevation, deliver payload and configuration, invoke,
//! clean up, disconnect. Cleanup and disconnect run on every path once a
//! transport exists.
//!
//! Parallel runs use a bounded pool of scoped worker threads pulling from
//! one host queue; the result sink is the only shared mutable state.
//! Serial runs consult a caller-supplied policy after each failed host.

pub mod cancel;
pub mod types;

pub use cancel::CancellationToken;
pub use types::{
    CoordinatorError, HostDescriptor, HostExecutionResult, HostFailureKind, MultiHostReport,
    SerialDecision,
};

use crate::config::EngineConfig;
use crate::transport::{verify_elevation, CommandLine, ExecOptions, Transport, TransportFactory};
use chrono::Utc;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Instant;
use stig_runtime::logging::codes::{coordination, success};
use stig_runtime::logging::{clear_host_context, take_host_events, with_host_context};
use stig_runtime::{log_debug, log_error, log_info, log_success, log_warning};
use types::capture_output;

// ============================================================================
// STAGED ARTIFACTS
// ============================================================================

/// Local files delivered to every host. The rendered configuration is
/// removed when the run ends.
struct StagedPayload {
    binary: PathBuf,
    config: PathBuf,
}

impl StagedPayload {
    fn prepare(config: &EngineConfig, binary: PathBuf) -> Result<Self, CoordinatorError> {
        let metadata = std::fs::metadata(&binary).map_err(|e| CoordinatorError::PayloadUnavailable {
            path: binary.display().to_string(),
            reason: e.to_string(),
        })?;
        if !metadata.is_file() {
            return Err(CoordinatorError::PayloadUnavailable {
                path: binary.display().to_string(),
                reason: "not a regular file".to_string(),
            });
        }

        // The remote engine runs single-host
        let mut remote = config.clone();
        remote.hosts.clear();
        let rendered = remote
            .to_toml_string()
            .map_err(|e| CoordinatorError::ConfigStaging { reason: e.to_string() })?;

        let path = std::env::temp_dir().join(format!("stig-remediate-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, rendered).map_err(|e| CoordinatorError::ConfigStaging {
            reason: format!("{}: {}", path.display(), e),
        })?;

        Ok(Self {
            binary,
            config: path,
        })
    }
}

impl Drop for StagedPayload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.config) {
            log_debug!(
                "Could not remove staged configuration",
                "path" => self.config.display(),
                "error" => e
            );
        }
    }
}

struct HostFailure {
    kind: HostFailureKind,
    message: String,
    exit_code: Option<i32>,
    output: String,
}

impl HostFailure {
    fn new(kind: HostFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            output: String::new(),
        }
    }
}

/// A connected transport. Dropping it removes the delivered artifacts and
/// disconnects, which also happens while a panic unwinds.
struct ConnectedHost<'c, 'a> {
    coordinator: &'c MultiHostCoordinator<'a>,
    transport: Box<dyn Transport>,
}

impl Drop for ConnectedHost<'_, '_> {
    fn drop(&mut self) {
        self.coordinator.cleanup(self.transport.as_ref());
        self.transport.disconnect();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// COORDINATOR
// ============================================================================

pub struct MultiHostCoordinator<'a> {
    config: &'a EngineConfig,
    factory: &'a dyn TransportFactory,
    payload: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<'a> MultiHostCoordinator<'a> {
    pub fn new(config: &'a EngineConfig, factory: &'a dyn TransportFactory) -> Self {
        Self {
            config,
            factory,
            payload: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Local binary delivered to each host; defaults to the running executable
    pub fn with_payload(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload = Some(path.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Parse every configured host, rejecting the run on the first bad one
    pub fn configured_hosts(&self) -> Result<Vec<HostDescriptor>, CoordinatorError> {
        self.config.hosts.iter().map(|h| HostDescriptor::parse(h)).collect()
    }

    /// Run in the mode the configuration asks for. Serial runs continue past
    /// a failed host only when errors are being ignored.
    pub fn run(&self, hosts: &[HostDescriptor]) -> Result<MultiHostReport, CoordinatorError> {
        if self.config.coordinator.parallel {
            self.run_parallel(hosts)
        } else {
            let ignore_errors = self.config.force.ignore_errors;
            self.run_serial(hosts, |_| {
                if ignore_errors {
                    SerialDecision::Continue
                } else {
                    SerialDecision::Abort
                }
            })
        }
    }

    pub fn run_parallel(&self, hosts: &[HostDescriptor]) -> Result<MultiHostReport, CoordinatorError> {
        let staged = self.stage(hosts)?;
        let started_at = Utc::now();
        let workers = self.config.coordinator.effective_workers().min(hosts.len());

        log_info!(
            "Starting parallel remediation",
            "hosts" => hosts.len(),
            "workers" => workers
        );

        let queue: Mutex<VecDeque<&HostDescriptor>> = Mutex::new(hosts.iter().collect());
        let sink: Mutex<Vec<HostExecutionResult>> = Mutex::new(Vec::with_capacity(hosts.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                let queue = &queue;
                let sink = &sink;
                let staged = &staged;
                scope.spawn(move || loop {
                    let next = lock(queue).pop_front();
                    let Some(host) = next else {
                        break;
                    };
                    let result = if self.cancel.is_cancelled() {
                        self.cancelled(host)
                    } else {
                        self.process_guarded(host, staged)
                    };
                    lock(sink).push(result);
                });
            }
        });

        let results = sink.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(self.finish(started_at, true, workers, results))
    }

    /// One host at a time. After each failed host `policy` decides whether
    /// the remaining hosts run; on abort they are reported as cancelled.
    pub fn run_serial<F>(
        &self,
        hosts: &[HostDescriptor],
        mut policy: F,
    ) -> Result<MultiHostReport, CoordinatorError>
    where
        F: FnMut(&HostExecutionResult) -> SerialDecision,
    {
        let staged = self.stage(hosts)?;
        let started_at = Utc::now();
        let mut results = Vec::with_capacity(hosts.len());
        let mut aborted = false;

        log_info!("Starting serial remediation", "hosts" => hosts.len());

        for host in hosts {
            if aborted || self.cancel.is_cancelled() {
                results.push(self.cancelled(host));
                continue;
            }

            let result = self.process_guarded(host, &staged);
            if !result.success && policy(&result) == SerialDecision::Abort {
                log_warning!(
                    "Serial run aborted after host failure",
                    "host" => host,
                    "code" => coordination::HOST_CANCELLED
                );
                aborted = true;
            }
            results.push(result);
        }

        Ok(self.finish(started_at, false, 1, results))
    }

    fn stage(&self, hosts: &[HostDescriptor]) -> Result<StagedPayload, CoordinatorError> {
        if hosts.is_empty() {
            return Err(CoordinatorError::NoHosts);
        }
        let binary = match &self.payload {
            Some(path) => path.clone(),
            None => std::env::current_exe().map_err(|e| CoordinatorError::PayloadUnavailable {
                path: "<current executable>".to_string(),
                reason: e.to_string(),
            })?,
        };
        StagedPayload::prepare(self.config, binary)
    }

    fn finish(
        &self,
        started_at: chrono::DateTime<Utc>,
        parallel: bool,
        workers: usize,
        results: Vec<HostExecutionResult>,
    ) -> MultiHostReport {
        let report = MultiHostReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            parallel,
            workers,
            results,
        };

        let duration_ms = (report.finished_at - report.started_at).num_milliseconds();
        if report.all_succeeded() {
            log_success!(
                success::OPERATION_COMPLETED,
                &report.summary(),
                "duration_ms" => duration_ms
            );
        } else {
            log_warning!(&report.summary(), "duration_ms" => duration_ms);
        }
        report
    }

    fn cancelled(&self, host: &HostDescriptor) -> HostExecutionResult {
        log_warning!(
            "Host skipped: run cancelled",
            "host" => host,
            "code" => coordination::HOST_CANCELLED
        );
        HostExecutionResult::cancelled(&host.to_string())
    }

    /// A panicking host must not take the whole pool down
    fn process_guarded(&self, host: &HostDescriptor, staged: &StagedPayload) -> HostExecutionResult {
        let label = host.to_string();
        match catch_unwind(AssertUnwindSafe(|| self.process_host(host, staged))) {
            Ok(result) => result,
            Err(panic) => {
                clear_host_context();
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                log_error!(
                    coordination::WORKER_PANICKED,
                    &format!("Worker panicked while processing host: {}", reason),
                    "host" => label
                );
                HostExecutionResult::failed(
                    &label,
                    HostFailureKind::Panicked,
                    format!("worker panicked: {}", reason),
                    std::time::Duration::ZERO,
                )
            }
        }
    }

    fn process_host(&self, host: &HostDescriptor, staged: &StagedPayload) -> HostExecutionResult {
        let label = host.to_string();
        let started = Instant::now();

        let outcome = with_host_context(&label, || {
            log_info!("Processing host", "host" => label);
            self.drive(host, staged)
        });

        let mut result = match outcome {
            Ok(output) => {
                log_success!(
                    success::HOST_COMPLETED,
                    "Host remediation completed",
                    "host" => label,
                    "duration_ms" => started.elapsed().as_millis()
                );
                HostExecutionResult::succeeded(&label, output, started.elapsed())
            }
            Err(failure) => {
                with_host_context(&label, || {
                    log_error!(
                        coordination::HOST_FAILED,
                        &failure.message,
                        "host" => label,
                        "kind" => failure.kind
                    );
                });
                let mut result =
                    HostExecutionResult::failed(&label, failure.kind, failure.message, started.elapsed());
                result.exit_code = failure.exit_code;
                result.output = failure.output;
                result
            }
        };

        for event in take_host_events(&label) {
            if event.is_error() && !result.errors.contains(&event.message) {
                result.errors.push(event.message);
            }
        }
        result
    }

    fn drive(&self, host: &HostDescriptor, staged: &StagedPayload) -> Result<String, HostFailure> {
        let mut transport = self
            .factory
            .create(host)
            .map_err(|e| HostFailure::new(HostFailureKind::Connect, e.to_string()))?;

        if let Err(e) = transport.connect() {
            transport.disconnect();
            let kind = if e.is_timeout() {
                HostFailureKind::Timeout
            } else {
                HostFailureKind::Connect
            };
            return Err(HostFailure::new(kind, e.to_string()));
        }

        let host = ConnectedHost {
            coordinator: self,
            transport,
        };
        self.remediate(host.transport.as_ref(), staged)
    }

    fn remediate(&self, transport: &dyn Transport, staged: &StagedPayload) -> Result<String, HostFailure> {
        let settings = &self.config.coordinator;
        let command_timeout = settings.command_timeout();

        verify_elevation(transport, command_timeout).map_err(|e| {
            let kind = if e.is_timeout() {
                HostFailureKind::Timeout
            } else {
                HostFailureKind::Elevation
            };
            HostFailure::new(kind, e.to_string())
        })?;

        self.deliver(transport, &staged.binary, &settings.remote_payload_path)?;
        self.deliver(transport, &staged.config, &settings.remote_config_path)?;

        let chmod = CommandLine::new("chmod").args(["755", settings.remote_payload_path.as_str()]);
        match transport.execute(&chmod, ExecOptions::elevated(command_timeout)) {
            Ok(output) if output.success() => {}
            Ok(output) => {
                return Err(HostFailure::new(
                    HostFailureKind::Delivery,
                    format!("could not mark payload executable: {}", output.stderr.trim()),
                ))
            }
            Err(e) => return Err(HostFailure::new(HostFailureKind::Delivery, e.to_string())),
        }

        let invocation = CommandLine::new(settings.remote_payload_path.as_str())
            .args(["--config", settings.remote_config_path.as_str()])
            .args(settings.payload_args.iter());

        log_debug!("Invoking remote remediation", "command" => invocation);

        let output = transport
            .execute(&invocation, ExecOptions::elevated(settings.remediation_timeout()))
            .map_err(|e| {
                let kind = if e.is_timeout() {
                    HostFailureKind::Timeout
                } else {
                    HostFailureKind::Execution
                };
                HostFailure::new(kind, e.to_string())
            })?;

        let captured = capture_output(&output.stdout, &output.stderr);
        if output.success() {
            Ok(captured)
        } else {
            Err(HostFailure {
                kind: HostFailureKind::NonZeroExit,
                message: format!("remote remediation exited with code {}", output.exit_code),
                exit_code: Some(output.exit_code),
                output: captured,
            })
        }
    }

    fn deliver(&self, transport: &dyn Transport, local: &Path, remote: &str) -> Result<(), HostFailure> {
        transport.put_file(local, remote).map_err(|e| {
            let kind = if e.is_timeout() {
                HostFailureKind::Timeout
            } else {
                HostFailureKind::Delivery
            };
            HostFailure::new(kind, e.to_string())
        })
    }

    /// Best effort; a failed cleanup is reported but never changes the host result
    fn cleanup(&self, transport: &dyn Transport) {
        let settings = &self.config.coordinator;
        let rm = CommandLine::new("rm").args([
            "-f",
            settings.remote_payload_path.as_str(),
            settings.remote_config_path.as_str(),
        ]);

        match transport.execute(&rm, ExecOptions::elevated(settings.command_timeout())) {
            Ok(output) if output.success() => {
                log_debug!("Delivered artifacts removed", "host" => transport.target());
            }
            Ok(output) => log_warning!(
                "Could not remove delivered artifacts",
                "host" => transport.target(),
                "stderr" => output.stderr.trim()
            ),
            Err(e) => log_warning!(
                "Could not remove delivered artifacts",
                "host" => transport.target(),
                "error" => e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoordinatorConfig;
    use crate::transport::{CallKind, ScriptedCall, ScriptedResponse, ScriptedTransport, TransportError};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    type Journal = Arc<Mutex<Vec<ScriptedCall>>>;
    type Script = Box<dyn Fn(&HostDescriptor) -> ScriptedTransport + Send + Sync>;

    struct ScriptedFactory {
        script: Script,
        journals: Mutex<BTreeMap<String, Journal>>,
        on_create: Option<Box<dyn Fn(&HostDescriptor) + Send + Sync>>,
    }

    impl ScriptedFactory {
        fn new(script: impl Fn(&HostDescriptor) -> ScriptedTransport + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                journals: Mutex::new(BTreeMap::new()),
                on_create: None,
            }
        }

        fn calls(&self, host: &str) -> Vec<ScriptedCall> {
            lock(&self.journals)
                .get(host)
                .map(|j| lock(j).clone())
                .unwrap_or_default()
        }

        fn created(&self) -> Vec<String> {
            lock(&self.journals).keys().cloned().collect()
        }
    }

    impl TransportFactory for ScriptedFactory {
        fn create(&self, host: &HostDescriptor) -> Result<Box<dyn Transport>, TransportError> {
            if let Some(hook) = &self.on_create {
                hook(host);
            }
            let transport = (self.script)(host);
            lock(&self.journals).insert(host.to_string(), transport.journal());
            Ok(Box::new(transport))
        }
    }

    fn healthy(host: &HostDescriptor) -> ScriptedTransport {
        ScriptedTransport::new(host.to_string()).respond("whoami", ScriptedResponse::stdout("root"))
    }

    fn payload() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stig-remediate");
        std::fs::write(&path, b"#!/bin/sh\n").unwrap();
        (dir, path)
    }

    fn config(parallel: bool) -> EngineConfig {
        EngineConfig::default().with_coordinator(
            CoordinatorConfig::default()
                .with_parallel(parallel)
                .with_max_workers(4),
        )
    }

    fn hosts(names: &[&str]) -> Vec<HostDescriptor> {
        names.iter().map(|n| HostDescriptor::new(*n)).collect()
    }

    fn kinds(calls: &[ScriptedCall]) -> Vec<CallKind> {
        calls.iter().map(|c| c.kind).collect()
    }

    #[test]
    fn test_parallel_success_and_timeout_are_both_reported() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| {
            let transport = healthy(host);
            if host.host == "par-h2" {
                transport.respond("/tmp/stig-remediate --config", ScriptedResponse::timeout(3_600_000))
            } else {
                transport.respond(
                    "/tmp/stig-remediate --config",
                    ScriptedResponse::stdout("SUCCESS: 4 controls applied"),
                )
            }
        });
        let config = config(true);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run(&hosts(&["par-h1", "par-h2"]))
            .unwrap();

        assert_eq!(report.results.len(), 2);
        assert_eq!(report.workers, 2);
        let h1 = report.result_for("par-h1").unwrap();
        assert!(h1.success);
        assert!(h1.output.contains("4 controls applied"));

        let h2 = report.result_for("par-h2").unwrap();
        assert!(!h2.success);
        assert!(h2.is_timeout());
        assert!(!h2.errors.is_empty());

        // Cleanup and disconnect happen on the failed host too
        let h2_calls = factory.calls("par-h2");
        assert!(h2_calls
            .iter()
            .any(|c| c.kind == CallKind::Execute && c.detail.starts_with("rm -f /tmp/stig-remediate")));
        assert_eq!(kinds(&h2_calls).last(), Some(&CallKind::Disconnect));
    }

    #[test]
    fn test_host_steps_run_in_order() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(healthy);
        let config = config(false);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run(&hosts(&["order-h1"]))
            .unwrap();
        assert!(report.all_succeeded());

        let calls = factory.calls("order-h1");
        let details: Vec<&str> = calls.iter().map(|c| c.detail.as_str()).collect();
        assert_eq!(
            details,
            vec![
                "order-h1",
                "whoami",
                "/tmp/stig-remediate",
                "/tmp/stig-remediate.toml",
                "chmod 755 /tmp/stig-remediate",
                "/tmp/stig-remediate --config /tmp/stig-remediate.toml run",
                "rm -f /tmp/stig-remediate /tmp/stig-remediate.toml",
                "order-h1",
            ]
        );
        assert_eq!(kinds(&calls).first(), Some(&CallKind::Connect));
        assert!(calls.iter().filter(|c| c.kind == CallKind::Execute).all(|c| c.elevated));
    }

    #[test]
    fn test_elevation_and_delivery_failures_are_classified() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| match host.host.as_str() {
            "cls-noroot" => ScriptedTransport::new(host.to_string())
                .respond("whoami", ScriptedResponse::stdout("deploy")),
            "cls-nodeliver" => healthy(host).fail_delivery("disk full"),
            "cls-noconnect" => healthy(host).fail_connect("connection refused"),
            _ => healthy(host).respond(
                "/tmp/stig-remediate --config",
                ScriptedResponse::exit(1, "FAILED: 11 errors", ""),
            ),
        });
        let config = config(true);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run(&hosts(&["cls-noroot", "cls-nodeliver", "cls-noconnect", "cls-exit"]))
            .unwrap();

        let failure = |h: &str| report.result_for(h).unwrap().failure;
        assert_eq!(failure("cls-noroot"), Some(HostFailureKind::Elevation));
        assert_eq!(failure("cls-nodeliver"), Some(HostFailureKind::Delivery));
        assert_eq!(failure("cls-noconnect"), Some(HostFailureKind::Connect));
        assert_eq!(failure("cls-exit"), Some(HostFailureKind::NonZeroExit));

        let exit = report.result_for("cls-exit").unwrap();
        assert_eq!(exit.exit_code, Some(1));
        assert!(exit.output.contains("11 errors"));

        // A refused connection never reaches cleanup but is still released
        assert_eq!(
            kinds(&factory.calls("cls-noconnect")),
            vec![CallKind::Connect, CallKind::Disconnect]
        );
        assert!(factory
            .calls("cls-nodeliver")
            .iter()
            .any(|c| c.detail.starts_with("rm -f")));
        assert_eq!(report.failed(), 4);
    }

    #[test]
    fn test_serial_abort_policy_cancels_remaining_hosts() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| {
            if host.host == "ser-h1" {
                healthy(host).fail_delivery("no space left")
            } else {
                healthy(host)
            }
        });
        let config = config(false);
        let mut consulted = Vec::new();

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run_serial(&hosts(&["ser-h1", "ser-h2", "ser-h3"]), |result| {
                consulted.push(result.host.clone());
                SerialDecision::Abort
            })
            .unwrap();

        assert_eq!(consulted, vec!["ser-h1".to_string()]);
        assert_eq!(factory.created(), vec!["ser-h1".to_string()]);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 2);
        assert_eq!(
            report.results.iter().map(|r| r.host.as_str()).collect::<Vec<_>>(),
            vec!["ser-h1", "ser-h2", "ser-h3"]
        );
    }

    #[test]
    fn test_serial_continue_policy_runs_every_host() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| {
            if host.host == "cont-h1" {
                healthy(host).fail_connect("unreachable")
            } else {
                healthy(host)
            }
        });
        let config = config(false);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run_serial(&hosts(&["cont-h1", "cont-h2"]), |_| SerialDecision::Continue)
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.cancelled(), 0);
    }

    #[test]
    fn test_cancellation_skips_unstarted_hosts() {
        let (_dir, binary) = payload();
        let token = CancellationToken::new();
        let trigger = token.clone();
        let mut factory = ScriptedFactory::new(healthy);
        factory.on_create = Some(Box::new(move |_: &HostDescriptor| trigger.cancel()));
        let config = config(false);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .with_cancellation(token)
            .run_serial(&hosts(&["can-h1", "can-h2", "can-h3"]), |_| SerialDecision::Continue)
            .unwrap();

        // The in-flight host finishes normally
        assert!(report.result_for("can-h1").unwrap().success);
        assert!(report.result_for("can-h2").unwrap().is_cancelled());
        assert!(report.result_for("can-h3").unwrap().is_cancelled());
        assert_eq!(factory.created(), vec!["can-h1".to_string()]);
    }

    #[test]
    fn test_cancelled_parallel_run_starts_nothing() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(healthy);
        let config = config(true);
        let coordinator = MultiHostCoordinator::new(&config, &factory).with_payload(&binary);
        coordinator.cancellation().cancel();

        let report = coordinator.run(&hosts(&["pc-h1", "pc-h2", "pc-h3"])).unwrap();
        assert_eq!(report.cancelled(), 3);
        assert!(factory.created().is_empty());
    }

    #[test]
    fn test_panicking_factory_is_contained() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| {
            if host.host == "pan-h1" {
                panic!("scripted factory failure");
            }
            healthy(host)
        });
        let config = config(true);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run(&hosts(&["pan-h1", "pan-h2"]))
            .unwrap();

        let panicked = report.result_for("pan-h1").unwrap();
        assert_eq!(panicked.failure, Some(HostFailureKind::Panicked));
        assert!(panicked.errors[0].contains("scripted factory failure"));
        assert!(report.result_for("pan-h2").unwrap().success);
    }

    #[test]
    fn test_panic_during_invocation_still_cleans_up() {
        let (_dir, binary) = payload();
        let factory = ScriptedFactory::new(|host| {
            healthy(host).respond(
                "/tmp/stig-remediate --config",
                ScriptedResponse::Panic("remote session crashed".to_string()),
            )
        });
        let config = config(false);

        let report = MultiHostCoordinator::new(&config, &factory)
            .with_payload(&binary)
            .run(&hosts(&["unw-h1"]))
            .unwrap();

        let result = report.result_for("unw-h1").unwrap();
        assert_eq!(result.failure, Some(HostFailureKind::Panicked));
        assert!(result.errors[0].contains("remote session crashed"));

        let calls = factory.calls("unw-h1");
        assert!(calls
            .iter()
            .any(|c| c.kind == CallKind::Execute && c.detail == "rm -f /tmp/stig-remediate /tmp/stig-remediate.toml"));
        assert_eq!(kinds(&calls).last(), Some(&CallKind::Disconnect));
    }

    #[test]
    fn test_setup_errors() {
        let factory = ScriptedFactory::new(healthy);
        let config = config(true);
        let coordinator = MultiHostCoordinator::new(&config, &factory);

        assert!(matches!(coordinator.run(&[]), Err(CoordinatorError::NoHosts)));

        let missing = MultiHostCoordinator::new(&config, &factory)
            .with_payload("/nonexistent/stig-remediate")
            .run(&hosts(&["setup-h1"]));
        assert!(matches!(missing, Err(CoordinatorError::PayloadUnavailable { .. })));
        assert!(factory.created().is_empty());

        let bad = EngineConfig::default().with_hosts(vec!["ok-host".into(), "bad:port".into()]);
        let coordinator = MultiHostCoordinator::new(&bad, &factory);
        assert!(matches!(coordinator.configured_hosts(), Err(CoordinatorError::InvalidHost { .. })));
    }
}
