//! # Remediation Orchestrator
//!
//! Runs one host through `Init -> Preflight -> Snapshot -> ApplyCategory(..)
//! -> PostValidate` and ends in exactly one [`TerminalState`]. Everything is
//! sequential; every finding lands in the run ledger.
//!
//! - Emergency mode skips all of that and only restores a recovery point.
//! - After each category the error budget is checked: more errors than the
//!   threshold aborts the run and rolls back when rollback is enabled.
//! - Post-validation failure rolls back, or fails hard when rollback is off.
//! - A rollback that does not complete marks the run critical.

pub mod ledger;
pub mod report;

pub use ledger::{ChangeRecord, ControlRecord, ErrorRecord, LedgerEntry, RunLedger, WarningRecord};
pub use report::{HostContext, RunReport, TerminalState};

use crate::config::EngineConfig;
use crate::controls::{Category, ControlCatalog, ControlContext};
use crate::identity::{default_resolver, IdentityResolver};
use crate::parameters::{
    ComplianceParameterManager, ParameterBackend, ParameterSnapshot, ParameterSpec, SysctlBackend,
};
use crate::preflight::{gate, CheckContext, PreflightError, PreflightValidator};
use crate::recovery::{RecoveryError, RecoveryPointManager};
use crate::transport::Transport;
use crate::validation::{ConfigPostValidator, ValidationContext, ValidationError};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use stig_runtime::logging::codes::{orchestration, success};
use stig_runtime::{log_error, log_info, log_success, log_warning, Code};

// ============================================================================
// PHASES AND ERRORS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Emergency,
    Preflight,
    Snapshot,
    ApplyCategory(Category),
    PostValidate,
    Rollback,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::ApplyCategory(category) => write!(f, "Apply {}", category),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Why a run stopped short of success
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error("Recovery point could not be created: {0}")]
    Snapshot(RecoveryError),

    #[error("Error budget exceeded after {category}: {errors} errors, threshold {threshold}")]
    BudgetExceeded {
        category: Category,
        errors: usize,
        threshold: usize,
    },

    #[error("Control {control} left the host in an inconsistent state")]
    CriticalControl { control: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Rollback failed: {0}")]
    Rollback(String),

    #[error("No recovery point available to restore")]
    NoRecoveryPoint,
}

impl OrchestratorError {
    pub fn code(&self) -> Code {
        match self {
            OrchestratorError::Preflight(e) => e.code(),
            OrchestratorError::Snapshot(_) => orchestration::SNAPSHOT_REQUIRED,
            OrchestratorError::BudgetExceeded { .. } => orchestration::ERROR_BUDGET_EXCEEDED,
            OrchestratorError::CriticalControl { .. } => orchestration::CONTROL_FAILED,
            OrchestratorError::Validation(e) => e.code(),
            OrchestratorError::Rollback(_) | OrchestratorError::NoRecoveryPoint => {
                orchestration::ROLLBACK_FAILED
            }
        }
    }

    pub fn is_critical(&self) -> bool {
        matches!(self, OrchestratorError::Rollback(_))
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

const COMPONENT: &str = "orchestrator";

pub struct RemediationOrchestrator<'a> {
    config: &'a EngineConfig,
    transport: &'a dyn Transport,
    catalog: &'a ControlCatalog,
    preflight: PreflightValidator,
    validator: ConfigPostValidator,
    recovery: RecoveryPointManager,
    parameters: Option<&'a dyn ParameterBackend>,
    identity: Arc<dyn IdentityResolver>,
    phase: RunPhase,
}

impl<'a> RemediationOrchestrator<'a> {
    pub fn new(config: &'a EngineConfig, transport: &'a dyn Transport, catalog: &'a ControlCatalog) -> Self {
        let identity: Arc<dyn IdentityResolver> = Arc::from(default_resolver());
        Self {
            config,
            transport,
            catalog,
            preflight: PreflightValidator::standard(),
            validator: ConfigPostValidator::standard(),
            recovery: RecoveryPointManager::new(config.recovery.clone()).with_identity(identity.clone()),
            parameters: None,
            identity,
            phase: RunPhase::Init,
        }
    }

    pub fn with_preflight(mut self, preflight: PreflightValidator) -> Self {
        self.preflight = preflight;
        self
    }

    pub fn with_validator(mut self, validator: ConfigPostValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryPointManager) -> Self {
        self.recovery = recovery;
        self
    }

    /// Use this backend for live parameters instead of `sysctl` over the transport
    pub fn with_parameter_backend(mut self, backend: &'a dyn ParameterBackend) -> Self {
        self.parameters = Some(backend);
        self
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn enter(&mut self, phase: RunPhase) {
        log_info!(&format!("Phase: {}", phase), "previous" => self.phase);
        self.phase = phase;
    }

    /// Execute the run. Always returns a report, whatever the terminal state.
    pub fn run(&mut self) -> RunReport {
        let config = self.config;
        let mut report = RunReport::new(
            config.dry_run,
            config.emergency,
            config.ordered_categories(),
            config.force.active().iter().map(|s| s.to_string()).collect(),
        );

        log_info!(
            "Starting remediation run",
            "run_id" => report.run_id,
            "target" => self.transport.target(),
            "dry_run" => config.dry_run
        );
        for flag in config.force.active() {
            log_warning!(&format!("Safety override active: {}", flag));
            report.ledger.warning(COMPONENT, format!("safety override active: {}", flag));
        }

        let sysctl = SysctlBackend::new(self.transport, config.command_timeout());
        let backend: &dyn ParameterBackend = match self.parameters {
            Some(backend) => backend,
            None => &sysctl,
        };

        let state = if config.emergency {
            self.emergency_restore(&mut report)
        } else {
            self.remediate(&mut report, backend)
        };

        report.finish(state);
        if report.critical {
            log_error!(
                orchestration::ROLLBACK_FAILED,
                "CRITICAL: host is in an unknown state and needs manual recovery",
                "run_id" => report.run_id
            );
        } else if state == TerminalState::Success {
            log_success!(success::RUN_COMPLETED, &report.summary_line(), "run_id" => report.run_id);
        } else {
            log_error!(orchestration::RUN_FAILED, &report.summary_line(), "run_id" => report.run_id);
        }
        report
    }

    // ------------------------------------------------------------------------
    // Emergency
    // ------------------------------------------------------------------------

    fn emergency_restore(&mut self, report: &mut RunReport) -> TerminalState {
        self.enter(RunPhase::Emergency);

        let id = match &self.config.emergency_point {
            Some(id) => Some(id.clone()),
            None => match self.recovery.latest() {
                Ok(latest) => latest.map(|m| m.recovery_id),
                Err(e) => {
                    return self.fail(report, OrchestratorError::Rollback(e.to_string()));
                }
            },
        };
        let Some(id) = id else {
            return self.fail(report, OrchestratorError::NoRecoveryPoint);
        };

        log_warning!(&format!("Emergency restore from {}", id));
        report.recovery_point = Some(id.clone());
        if self.config.dry_run {
            report.ledger.change(COMPONENT, format!("would restore {}", id));
            return TerminalState::Success;
        }

        match self.recovery.restore(&id) {
            Ok(summary) => {
                report.ledger.change(COMPONENT, format!("restored {} items from {}", summary.restored.len(), id));
                TerminalState::RolledBack
            }
            Err(e) => {
                report.critical = e.is_critical();
                self.fail(report, OrchestratorError::Rollback(e.to_string()))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Remediation
    // ------------------------------------------------------------------------

    fn remediate(&mut self, report: &mut RunReport, backend: &dyn ParameterBackend) -> TerminalState {
        let config = self.config;

        // Preflight
        if config.force.skip_preflight {
            log_warning!("Pre-flight checks skipped");
            report.ledger.warning("preflight", "pre-flight checks skipped");
        } else {
            self.enter(RunPhase::Preflight);
            let preflight = self
                .preflight
                .run_all(&CheckContext::from_config(self.transport, config));
            for warning in preflight.warnings() {
                report.ledger.warning("preflight", warning);
            }
            let decision = gate(&preflight, &config.force);
            report.preflight = Some(preflight);
            match decision.into_result() {
                Ok(bypassed) => {
                    for failure in bypassed {
                        report.ledger.warning("preflight", format!("bypassed: {}", failure));
                    }
                }
                Err(e) => return self.fail(report, e.into()),
            }
        }

        // Snapshot
        self.enter(RunPhase::Snapshot);
        let parameter_manager = self.parameter_manager(backend);
        let mut parameter_snapshot = None;
        if config.dry_run {
            log_info!("[DRY RUN] No recovery point taken");
        } else if config.force.no_backup {
            log_warning!(
                "HIGH RISK: running without a recovery point",
                "code" => orchestration::SNAPSHOT_REQUIRED
            );
            report.ledger.warning(COMPONENT, "no recovery point taken (no_backup)");
        } else {
            match self.recovery.create("pre_remediation") {
                Ok(point) => {
                    report.ledger.change("recovery", format!("recovery point {} created", point.id));
                    report.recovery_point = Some(point.id);
                }
                Err(e) => return self.fail(report, OrchestratorError::Snapshot(e)),
            }
            if let Some(manager) = &parameter_manager {
                let snapshot = manager.create_snapshot();
                report.parameter_snapshot = Some(snapshot.snapshot_id.clone());
                parameter_snapshot = Some(snapshot);
            }
        }

        // Categories
        let ctx = ControlContext {
            transport: self.transport,
            parameters: backend,
            identity: self.identity.clone(),
            config,
        };
        for category in config.ordered_categories() {
            self.enter(RunPhase::ApplyCategory(category));
            if let Err(e) = self.apply_category(category, &ctx, report) {
                return self.abort(report, e, parameter_manager.as_ref(), parameter_snapshot.as_ref());
            }
        }

        // Post-validation
        if config.dry_run {
            log_info!("[DRY RUN] Post-validation skipped");
            return TerminalState::Success;
        }
        if config.force.skip_validation {
            log_warning!("Post-change validation skipped");
            report.ledger.warning("validation", "post-change validation skipped");
            return TerminalState::Success;
        }

        self.enter(RunPhase::PostValidate);
        let outcome = self
            .validator
            .validate_all(&ValidationContext::from_config(self.transport, config));
        for warning in &outcome.warnings {
            report.ledger.warning("validation", warning.clone());
        }
        for error in &outcome.errors {
            report.ledger.error("validation", error.clone());
        }
        report.validation = Some(outcome.clone());

        match outcome.into_result() {
            Ok(_) => TerminalState::Success,
            Err(e) => self.abort(report, e.into(), parameter_manager.as_ref(), parameter_snapshot.as_ref()),
        }
    }

    fn apply_category(
        &self,
        category: Category,
        ctx: &ControlContext<'_>,
        report: &mut RunReport,
    ) -> Result<(), OrchestratorError> {
        let config = self.config;
        let controls = self.catalog.in_category(category);
        log_info!(&format!("Applying {} controls", category), "count" => controls.len());

        for control in controls {
            if control.high_risk() && !config.force.apply_all {
                log_warning!(
                    &format!("Skipping high-risk control {}: {}", control.id(), control.description()),
                    "category" => category
                );
                report.skipped_high_risk.push(control.id().to_string());
                report
                    .ledger
                    .warning(control.id(), "high-risk control skipped; use apply_all to include it");
                continue;
            }

            match control.apply(ctx) {
                Ok(outcome) => {
                    for change in outcome.changes {
                        report.ledger.change(control.id(), change);
                    }
                    for warning in outcome.warnings {
                        report.ledger.warning(control.id(), warning);
                    }
                    if outcome.applied {
                        if !config.dry_run {
                            log_success!(success::CONTROL_APPLIED, control.description(), "control" => control.id());
                        }
                        report.ledger.record_control(control.id(), control.description(), category);
                    }
                }
                Err(e) if e.is_critical() => {
                    log_error!(e.code(), &e.to_string(), "control" => control.id());
                    report.ledger.error(control.id(), e.to_string());
                    return Err(OrchestratorError::CriticalControl {
                        control: control.id().to_string(),
                    });
                }
                Err(e) if config.force.ignore_errors => {
                    log_warning!(&format!("Ignored: {}", e), "control" => control.id());
                    report.ledger.warning(control.id(), format!("ignored error: {}", e));
                }
                Err(e) => {
                    log_error!(e.code(), &e.to_string(), "control" => control.id());
                    report.ledger.error(control.id(), e.to_string());
                }
            }
        }

        let errors = report.ledger.error_count();
        if errors > config.error_threshold {
            log_error!(
                orchestration::ERROR_BUDGET_EXCEEDED,
                &format!("Too many errors after {}", category),
                "errors" => errors,
                "threshold" => config.error_threshold
            );
            return Err(OrchestratorError::BudgetExceeded {
                category,
                errors,
                threshold: config.error_threshold,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Failure paths
    // ------------------------------------------------------------------------

    fn fail(&self, report: &mut RunReport, error: OrchestratorError) -> TerminalState {
        log_error!(error.code(), &error.to_string(), "phase" => self.phase);
        report.ledger.error(COMPONENT, error.to_string());
        report.failure = Some(error.to_string());
        TerminalState::Failed
    }

    /// Roll back when enabled, otherwise fail in place
    fn abort(
        &mut self,
        report: &mut RunReport,
        error: OrchestratorError,
        parameters: Option<&ComplianceParameterManager<&dyn ParameterBackend>>,
        parameter_snapshot: Option<&ParameterSnapshot>,
    ) -> TerminalState {
        report.failure = Some(error.to_string());
        log_error!(error.code(), &error.to_string(), "phase" => self.phase);

        if !self.config.rollback_enabled() {
            log_warning!("Rollback disabled; host left as is");
            report.ledger.warning(COMPONENT, "rollback disabled; changes left in place");
            return TerminalState::Failed;
        }
        let Some(point) = report.recovery_point.clone() else {
            return TerminalState::Failed;
        };

        self.enter(RunPhase::Rollback);
        let mut problems = Vec::new();

        if let Err(e) = self.recovery.restore(&point) {
            problems.push(e.to_string());
        }
        if let (Some(manager), Some(snapshot)) = (parameters, parameter_snapshot) {
            if let Err(e) = manager.restore_from_snapshot(snapshot) {
                problems.push(e.to_string());
            }
        }

        if problems.is_empty() {
            report.ledger.change("recovery", format!("rolled back to {}", point));
            log_success!(success::RECOVERY_POINT_RESTORED, &format!("Rolled back to {}", point));
            TerminalState::RolledBack
        } else {
            report.critical = true;
            let error = OrchestratorError::Rollback(problems.join("; "));
            log_error!(error.code(), &error.to_string(), "recovery_point" => point);
            report.ledger.error("recovery", error.to_string());
            TerminalState::Failed
        }
    }

    /// Manager over every live parameter a selected control may touch
    fn parameter_manager<'b>(
        &self,
        backend: &'b dyn ParameterBackend,
    ) -> Option<ComplianceParameterManager<&'b dyn ParameterBackend>> {
        let mut seen = BTreeSet::new();
        let specs: Vec<ParameterSpec> = self
            .config
            .ordered_categories()
            .into_iter()
            .flat_map(|category| self.catalog.in_category(category))
            .flat_map(|control| control.parameter_specs().iter().cloned())
            .filter(|spec| seen.insert(spec.name.clone()))
            .collect();

        if specs.is_empty() {
            return None;
        }
        Some(
            ComplianceParameterManager::new(specs, backend, self.config.parameters.clone())
                .with_identity(self.identity.clone()),
        )
    }
}
