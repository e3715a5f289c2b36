//! # Pre-flight Validation
//!
//! Independent read-only checks that run before anything on the host is
//! changed. Every check runs even when an earlier one fails; the gate then
//! decides, from the force flags, whether the run may proceed.

pub mod checks;

pub use checks::{
    BackupStorageCheck, CriticalFilesCheck, DiskSpaceCheck, InteractiveSessionCheck,
    NetworkCheck, OsVersionCheck, PackageLockCheck, PrivilegeCheck, ServiceHealthCheck,
    SnapshotAvailabilityCheck,
};

use crate::config::{EngineConfig, ForceFlags, PreflightSettings};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stig_runtime::logging::codes::{preflight, success};
use stig_runtime::{log_error, log_info, log_success, log_warning};

// ============================================================================
// CHECK RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    pub message: String,
    /// Advisory findings; never affect `passed`
    pub warnings: Vec<String>,
}

impl CheckResult {
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    pub fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            message: message.into(),
            warnings: Vec::new(),
        }
    }

    /// Passing result that carries a warning
    pub fn advisory(name: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            name: name.to_string(),
            passed: true,
            warnings: vec![message.clone()],
            message,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    pub results: Vec<CheckResult>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> Vec<&CheckResult> {
        self.results.iter().filter(|r| !r.passed).collect()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.warnings.iter().map(move |w| format!("{}: {}", r.name, w)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.results.iter().find(|r| r.name == name)
    }
}

// ============================================================================
// CHECK TRAIT
// ============================================================================

/// Everything a check may look at
pub struct CheckContext<'a> {
    pub transport: &'a dyn Transport,
    pub settings: &'a PreflightSettings,
    pub override_os: bool,
    pub snapshot_required: bool,
    pub timeout: Duration,
}

impl<'a> CheckContext<'a> {
    pub fn from_config(transport: &'a dyn Transport, config: &'a EngineConfig) -> Self {
        Self {
            transport,
            settings: &config.preflight,
            override_os: config.force.override_os,
            snapshot_required: config.snapshot_required,
            timeout: config.command_timeout(),
        }
    }
}

/// A single read-only pre-flight check
pub trait PreflightCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect the host. Must not modify it, apart from scratch files the check removes again.
    fn run(&self, ctx: &CheckContext<'_>) -> CheckResult;
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct PreflightValidator {
    checks: Vec<Box<dyn PreflightCheck>>,
}

impl PreflightValidator {
    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    /// The full standard check set
    pub fn standard() -> Self {
        Self::empty()
            .with_check(PrivilegeCheck)
            .with_check(OsVersionCheck)
            .with_check(DiskSpaceCheck)
            .with_check(ServiceHealthCheck)
            .with_check(NetworkCheck)
            .with_check(BackupStorageCheck)
            .with_check(InteractiveSessionCheck::default())
            .with_check(SnapshotAvailabilityCheck)
            .with_check(CriticalFilesCheck)
            .with_check(PackageLockCheck)
    }

    pub fn with_check(mut self, check: impl PreflightCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn run_all(&self, ctx: &CheckContext<'_>) -> PreflightReport {
        log_info!("Running pre-flight checks", "count" => self.checks.len());

        let results = self
            .checks
            .iter()
            .map(|check| {
                let result = check.run(ctx);
                if result.passed {
                    log_info!(&format!("Pre-flight check passed: {}", result.message), "check" => result.name);
                } else {
                    log_error!(preflight::CHECK_FAILED, &result.message, "check" => result.name);
                }
                for warning in &result.warnings {
                    log_warning!(warning, "check" => result.name);
                }
                result
            })
            .collect();

        PreflightReport { results }
    }
}

impl Default for PreflightValidator {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// GATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    /// Failures present but force mode is on
    Bypassed(Vec<String>),
    Blocked(Vec<String>),
}

impl GateDecision {
    pub fn may_proceed(&self) -> bool {
        !matches!(self, GateDecision::Blocked(_))
    }

    /// Bypassed failures on success
    pub fn into_result(self) -> Result<Vec<String>, PreflightError> {
        match self {
            GateDecision::Proceed => Ok(Vec::new()),
            GateDecision::Bypassed(failures) => Ok(failures),
            GateDecision::Blocked(failures) => Err(PreflightError::Blocked { failures }),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PreflightError {
    #[error("Pre-flight checks failed: {}", failures.join("; "))]
    Blocked { failures: Vec<String> },
}

impl PreflightError {
    pub fn code(&self) -> stig_runtime::Code {
        match self {
            PreflightError::Blocked { .. } => preflight::GATE_BLOCKED,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PreflightError::Blocked { failures } => format!(
                "{} pre-flight check(s) failed. Fix them or re-run with force mode.",
                failures.len()
            ),
        }
    }
}

/// Decide whether mutation may start. Every bypassed failure is logged individually.
pub fn gate(report: &PreflightReport, force: &ForceFlags) -> GateDecision {
    let failures: Vec<String> = report
        .failures()
        .iter()
        .map(|r| format!("{}: {}", r.name, r.message))
        .collect();

    if failures.is_empty() {
        log_success!(success::PREFLIGHT_PASSED, "All pre-flight checks passed");
        return GateDecision::Proceed;
    }

    if force.enabled {
        for failure in &failures {
            log_warning!(
                &format!("Pre-flight failure bypassed by force mode: {}", failure),
                "code" => preflight::CHECK_BYPASSED
            );
        }
        GateDecision::Bypassed(failures)
    } else {
        log_error!(
            preflight::GATE_BLOCKED,
            "Pre-flight checks failed; no changes will be made",
            "failures" => failures.len()
        );
        GateDecision::Blocked(failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ScriptedResponse, ScriptedTransport};

    struct Fixed(&'static str, bool);

    impl PreflightCheck for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn run(&self, _ctx: &CheckContext<'_>) -> CheckResult {
            if self.1 {
                CheckResult::pass(self.0, "fine")
            } else {
                CheckResult::fail(self.0, "broken")
            }
        }
    }

    fn context<'a>(transport: &'a ScriptedTransport, settings: &'a PreflightSettings) -> CheckContext<'a> {
        CheckContext {
            transport,
            settings,
            override_os: false,
            snapshot_required: false,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_all_checks_run_after_failure() {
        let transport = ScriptedTransport::new("local");
        let settings = PreflightSettings::default();
        let validator = PreflightValidator::empty()
            .with_check(Fixed("first", false))
            .with_check(Fixed("second", true))
            .with_check(Fixed("third", false));

        let report = validator.run_all(&context(&transport, &settings));
        assert_eq!(report.results.len(), 3);
        assert!(!report.passed());
        assert_eq!(report.failures().len(), 2);
        assert!(report.get("second").unwrap().passed);
    }

    #[test]
    fn test_gate_decisions() {
        let report = PreflightReport {
            results: vec![CheckResult::pass("a", "ok"), CheckResult::fail("b", "disk full")],
        };

        assert_eq!(
            gate(&report, &ForceFlags::default()),
            GateDecision::Blocked(vec!["b: disk full".to_string()])
        );

        let forced = ForceFlags {
            enabled: true,
            ..ForceFlags::default()
        };
        let decision = gate(&report, &forced);
        assert!(decision.may_proceed());
        assert_matches::assert_matches!(decision, GateDecision::Bypassed(ref f) if f.len() == 1);

        let clean = PreflightReport {
            results: vec![CheckResult::advisory("c", "interactive session")],
        };
        assert_eq!(gate(&clean, &ForceFlags::default()), GateDecision::Proceed);
        assert_eq!(clean.warnings(), vec!["c: interactive session".to_string()]);

        let err = gate(&report, &ForceFlags::default()).into_result().unwrap_err();
        assert_eq!(err.code(), preflight::GATE_BLOCKED);
        assert_eq!(gate(&report, &forced).into_result().unwrap().len(), 1);
    }

    #[test]
    fn test_standard_set() {
        let names = PreflightValidator::standard().check_names();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"privilege"));
        assert!(names.contains(&"package_locks"));

        let transport = ScriptedTransport::new("local").respond("id -u", ScriptedResponse::stdout("0\n"));
        let settings = PreflightSettings::default();
        let result = PrivilegeCheck.run(&context(&transport, &settings));
        assert!(result.passed);
    }
}
