//! Subcommand implementations
//!
//! Each handler prints a human summary and returns the process exit code.

use chrono::{Duration as ChronoDuration, Utc};
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;
use stig_engine::config::EngineConfig;
use stig_engine::controls::ControlCatalog;
use stig_engine::coordinator::{MultiHostCoordinator, MultiHostReport};
use stig_engine::orchestrator::{RemediationOrchestrator, RunReport, TerminalState};
use stig_engine::parameters::{ubuntu_kernel_catalog, ComplianceParameterManager, SysctlBackend};
use stig_engine::preflight::{gate, CheckContext, PreflightValidator};
use stig_engine::recovery::RecoveryPointManager;
use stig_engine::transport::{LocalTransport, Secret};
use stig_engine::validation::{ConfigPostValidator, ValidationContext};
use stig_runtime::logging::codes::success;
use stig_runtime::{log_info, log_success, log_warning};

use crate::args::{ParamsCommand, RecoveryCommand, RemoteArgs};
use crate::commands::create_remediation_runner;
use crate::error::CliError;
use crate::ssh::{SshOptions, SshTransportFactory};

/// Environment variable holding the sudo password, when passwordless sudo is not set up
pub const SUDO_PASSWORD_ENV: &str = "STIG_SUDO_PASSWORD";

/// Run finished but left errors, warnings-as-errors, or a rollback behind
pub const EXIT_INCOMPLETE: u8 = 1;
/// The host may be in an inconsistent state
pub const EXIT_CRITICAL: u8 = 2;

fn sudo_secret() -> Option<Secret> {
    std::env::var(SUDO_PASSWORD_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map(Secret::new)
}

pub fn local_transport() -> LocalTransport {
    let transport = LocalTransport::new(create_remediation_runner());
    match sudo_secret() {
        Some(secret) => transport.with_sudo_secret(secret),
        None => transport,
    }
}

pub fn load_catalog(path: Option<&Path>) -> Result<ControlCatalog, CliError> {
    match path {
        Some(path) => {
            let catalog = ControlCatalog::from_toml_file(path)?;
            log_info!("Control catalog loaded", "path" => path.display(), "controls" => catalog.len());
            Ok(catalog)
        }
        None => Ok(ControlCatalog::builtin()),
    }
}

fn save_json(path: &Path, save: impl FnOnce(&Path) -> std::io::Result<()>) -> Result<(), CliError> {
    save(path).map_err(|source| CliError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    println!("Report written to {}", path.display());
    Ok(())
}

// ============================================================================
// RUN
// ============================================================================

/// Zero only for a clean run: success with nothing in the error ledger
pub fn run_status(report: &RunReport) -> u8 {
    if report.critical {
        EXIT_CRITICAL
    } else if report.is_clean() {
        0
    } else {
        EXIT_INCOMPLETE
    }
}

pub fn run(config: &EngineConfig, catalog: &ControlCatalog, report_path: Option<&Path>) -> Result<ExitCode, CliError> {
    let transport = local_transport();
    let report = RemediationOrchestrator::new(config, &transport, catalog).run();

    print_run_report(&report);
    if let Some(path) = report_path {
        save_json(path, |p| report.save_json(p))?;
    }
    Ok(ExitCode::from(run_status(&report)))
}

fn print_run_report(report: &RunReport) {
    println!("\n=== Remediation {} ===", report.run_id);
    if let Some(point) = &report.recovery_point {
        println!("Recovery point: {}", point);
    }
    for control in report.ledger.controls() {
        println!("  [applied] {} ({}) {}", control.id, control.category, control.description);
    }
    for change in report.ledger.changes() {
        println!("  [change]  {}: {}", change.component, change.message);
    }
    for warning in report.ledger.warnings() {
        println!("  [warn]    {}: {}", warning.component, warning.message);
    }
    for error in report.ledger.errors() {
        println!("  [error]   {}: {}", error.component, error.message);
    }
    if !report.skipped_high_risk.is_empty() {
        println!(
            "  High-risk controls skipped (use --apply-all): {}",
            report.skipped_high_risk.join(", ")
        );
    }
    if let Some(failure) = &report.failure {
        println!("Failure: {}", failure);
    }
    println!("{}", report.summary_line());
    if report.state == TerminalState::RolledBack {
        println!("The host was restored to its pre-remediation state.");
    }
}

// ============================================================================
// REMOTE
// ============================================================================

pub fn remote(config: &EngineConfig, args: &RemoteArgs) -> Result<ExitCode, CliError> {
    let mut options = SshOptions::default();
    if let Some(identity) = &args.identity_file {
        options = options.with_identity_file(identity);
    }
    if let Some(secret) = sudo_secret() {
        options = options.with_sudo_secret(secret);
    }
    let factory = SshTransportFactory::new(options);

    let mut coordinator = MultiHostCoordinator::new(config, &factory);
    if let Some(payload) = &args.payload {
        coordinator = coordinator.with_payload(payload);
    }

    let hosts = coordinator.configured_hosts()?;
    let report = coordinator.run(&hosts)?;

    print_hosts_report(&report);
    if let Some(path) = &args.hosts_report {
        save_json(path, |p| report.save_json(p))?;
    }

    Ok(if report.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INCOMPLETE)
    })
}

fn print_hosts_report(report: &MultiHostReport) {
    println!("\n=== Multi-host run {} ===", report.run_id);
    for result in &report.results {
        let status = match result.failure {
            None => "OK".to_string(),
            Some(kind) => format!("FAILED ({})", kind),
        };
        println!("  {:<32} {:<24} {}ms", result.host, status, result.duration_ms);
        for error in &result.errors {
            println!("      {}", error);
        }
    }
    println!("{}", report.summary());
}

// ============================================================================
// PREFLIGHT AND VALIDATION
// ============================================================================

pub fn preflight(config: &EngineConfig) -> Result<ExitCode, CliError> {
    let transport = local_transport();
    let report = PreflightValidator::standard().run_all(&CheckContext::from_config(&transport, config));

    for result in &report.results {
        let mark = if result.passed { "PASS" } else { "FAIL" };
        println!("  [{}] {:<24} {}", mark, result.name, result.message);
        for warning in &result.warnings {
            println!("         warning: {}", warning);
        }
    }

    let bypassed = gate(&report, &config.force).into_result()?;
    if bypassed.is_empty() {
        println!("Pre-flight passed");
    } else {
        println!("Pre-flight failures bypassed by force mode: {}", bypassed.len());
    }
    Ok(ExitCode::SUCCESS)
}

pub fn validate(config: &EngineConfig) -> Result<ExitCode, CliError> {
    let transport = local_transport();
    let outcome = ConfigPostValidator::standard().validate_all(&ValidationContext::from_config(&transport, config));

    for warning in &outcome.warnings {
        println!("  [warn]  {}", warning);
    }
    for error in &outcome.errors {
        println!("  [error] {}", error);
    }

    if outcome.all_valid {
        println!("All configuration artifacts are valid");
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{} configuration error(s) found", outcome.errors.len());
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

// ============================================================================
// RECOVERY
// ============================================================================

pub fn recovery(config: &EngineConfig, command: &RecoveryCommand) -> Result<ExitCode, CliError> {
    let manager = RecoveryPointManager::new(config.recovery.clone());

    match command {
        RecoveryCommand::List => {
            let points = manager.list()?;
            if points.is_empty() {
                println!("No recovery points under {}", manager.storage_root().display());
            }
            for point in points.iter().rev() {
                println!(
                    "  {:<40} {}  {} files, {} directories",
                    point.recovery_id,
                    point.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    point.files.len(),
                    point.directories.len()
                );
            }
        }
        RecoveryCommand::Create { name } => {
            let point = manager.create(name)?;
            println!("Created recovery point {} at {}", point.id, point.path.display());
        }
        RecoveryCommand::Restore { id } => {
            let summary = manager.restore(id)?;
            println!("Restored {} item(s) from {}", summary.restored.len(), summary.id);
            println!("Restart sshd and auditd to pick up restored settings");
        }
        RecoveryCommand::Prune { older_than_days, dry_run } => {
            let cutoff = older_than_days.map(|days| Utc::now() - ChronoDuration::days(i64::from(days)));
            if *dry_run {
                let expired = match cutoff {
                    Some(cutoff) => manager.expired_before(cutoff)?,
                    None => manager.expired()?,
                };
                for point in &expired {
                    println!("  would remove {}", point.path.display());
                }
                println!("{} recovery point(s) outside the retention window", expired.len());
            } else {
                let removed = match cutoff {
                    Some(cutoff) => manager.prune_before(cutoff)?,
                    None => manager.prune()?,
                };
                println!("Removed {} recovery point(s)", removed.len());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// PARAMETERS
// ============================================================================

pub fn params(config: &EngineConfig, command: &ParamsCommand) -> Result<ExitCode, CliError> {
    let transport = local_transport();
    let backend = SysctlBackend::new(&transport, config.command_timeout());
    let manager = ComplianceParameterManager::new(ubuntu_kernel_catalog(), backend, config.parameters.clone());

    match command {
        ParamsCommand::Validate => {
            let summary = manager.validate_current();
            for result in &summary.results {
                let state = if result.compliant {
                    "ok"
                } else if result.is_unreadable() {
                    "unreadable"
                } else {
                    "drift"
                };
                println!(
                    "  {:<44} {:<10} current={} desired={}",
                    result.name,
                    state,
                    result.current.as_deref().unwrap_or("-"),
                    result.desired
                );
            }
            println!(
                "{}/{} compliant ({:.1}%)",
                summary.compliant().len(),
                summary.total(),
                summary.score()
            );
            return Ok(exit_when(!summary.drift_detected()));
        }
        ParamsCommand::Report { json } => {
            let report = manager.generate_compliance_report();
            if *json {
                println!("{}", serde_json::to_string_pretty(&report).map_err(|e| CliError::Output {
                    path: "stdout".into(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                })?);
            } else {
                println!("Compliance score: {:.1}% (grade {})", report.score, report.grade);
                println!("Missing from persistent configuration: {}", report.persistence.missing.len());
                println!("Parameters requiring reboot: {}", report.reboot.require_reboot.len());
                println!("Conflict warnings: {}", report.conflicts.len());
                println!("Overall performance impact: {}", report.performance.overall);
                for rec in &report.recommendations {
                    println!("  [{:?}] {}: {} -> {}", rec.priority, rec.category, rec.issue, rec.action);
                }
            }
            return Ok(exit_when(report.score >= 100.0));
        }
        ParamsCommand::Apply { no_rollback } => {
            let outcome = manager.apply_all(!no_rollback)?;
            for change in &outcome.changes {
                println!(
                    "  {}: {} -> {}",
                    change.name,
                    change.from.as_deref().unwrap_or("unset"),
                    change.to
                );
            }
            for name in &outcome.skipped {
                println!("  skipped {} (not present on this kernel)", name);
            }
            if !outcome.reboot_pending.is_empty() {
                log_warning!(
                    "Reboot required for some parameters to take full effect",
                    "parameters" => outcome.reboot_pending.join(", ")
                );
            }
            log_success!(
                success::PARAMETERS_APPLIED,
                "Kernel parameters applied",
                "score" => format!("{:.1}", outcome.score),
                "snapshot" => outcome.snapshot_id
            );
            return Ok(exit_when(outcome.persistence_verified));
        }
        ParamsCommand::ApplyGroup { group, dry_run } => {
            let outcome = manager.apply_group(group, *dry_run)?;
            let verb = if outcome.dry_run { "would set" } else { "set" };
            for name in &outcome.applied {
                println!("  {} {}", verb, name);
            }
            for failure in &outcome.failed {
                println!("  failed {}", failure);
            }
            return Ok(exit_when(outcome.success()));
        }
        ParamsCommand::Groups => {
            for (group, specs) in manager.groups() {
                println!("{} ({} parameters)", group, specs.len());
                for spec in specs {
                    println!("  {} = {}", spec.name, spec.desired);
                }
            }
        }
        ParamsCommand::Audit => {
            let audit = manager.audit_history();
            for (name, state) in &audit.current_state {
                let mark = if state.compliant { "ok" } else { "drift" };
                println!("  {:<44} {:<6} {} (expected {})", name, mark, state.current, state.expected);
            }
            match &audit.store {
                Some(store) => println!("Persisted store: {} ({} bytes)", store.path.display(), store.size),
                None => println!("No persisted store written yet"),
            }
            return Ok(exit_when(audit.drift.is_empty()));
        }
        ParamsCommand::TestChange { name, value, hold } => {
            let outcome = manager.test_change(name, value, Duration::from_secs(*hold))?;
            println!(
                "{}: original={} test={} applied={} reverted={}",
                outcome.name, outcome.original, outcome.test_value, outcome.applied, outcome.reverted
            );
            if let Some(error) = &outcome.error {
                println!("  error: {}", error);
            }
            if !outcome.reverted {
                return Ok(ExitCode::from(EXIT_CRITICAL));
            }
            return Ok(exit_when(outcome.applied));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn exit_when(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INCOMPLETE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stig_engine::controls::Category;
    use tempfile::TempDir;

    fn report(state: TerminalState, errors: usize, critical: bool) -> RunReport {
        let mut report = RunReport::new(false, false, vec![Category::CatII], Vec::new());
        for i in 0..errors {
            report.ledger.error("controls", format!("failure {}", i));
        }
        report.state = state;
        report.critical = critical;
        report
    }

    #[test]
    fn test_exit_status_follows_run_outcome() {
        assert_eq!(run_status(&report(TerminalState::Success, 0, false)), 0);
        assert_eq!(run_status(&report(TerminalState::Success, 1, false)), EXIT_INCOMPLETE);
        assert_eq!(run_status(&report(TerminalState::RolledBack, 3, false)), EXIT_INCOMPLETE);
        assert_eq!(run_status(&report(TerminalState::Failed, 3, true)), EXIT_CRITICAL);
    }

    #[test]
    fn test_catalog_loading() {
        let builtin = load_catalog(None).unwrap();
        assert!(!builtin.is_empty());

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("catalog.toml");
        std::fs::write(&path, "[[control]]\nid = \"V-1\"\n").unwrap();
        assert!(matches!(load_catalog(Some(&path)), Err(CliError::Catalog(_))));
    }

    #[test]
    fn test_recovery_list_on_empty_storage() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig::default().with_storage_root(dir.path().join("backups"));
        assert!(recovery(&config, &RecoveryCommand::List).is_ok());

        let missing = recovery(&config, &RecoveryCommand::Restore { id: "nope".to_string() });
        assert!(matches!(missing, Err(CliError::Recovery(_))));
    }
}
