//! Validation, analysis and atomic apply-with-rollback over a parameter set

use super::backend::ParameterBackend;
use super::error::ParameterError;
use super::render::{parse_assignments, render_store, StoreHeader};
use super::report::{
    ComplianceReport, ConflictFinding, ConflictSource, ImpactAssessment, ImpactEntry,
    ParameterValidationResult, PersistedValue, PersistenceReport, RebootAnalysis,
    ValidationSummary,
};
use super::spec::{values_match, ImpactLevel, ParameterSpec, GROUPS};
use crate::config::ParameterSettings;
use crate::files::{atomic_write, FileAttributes};
use crate::identity::{default_resolver, IdentityResolver};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stig_runtime::logging::codes::{parameters, success};
use stig_runtime::{log_debug, log_error, log_info, log_success, log_warning};

// ============================================================================
// RESULT TYPES
// ============================================================================

/// Live values of every spec at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSnapshot {
    pub snapshot_id: String,
    pub taken_at: DateTime<Utc>,
    /// `None` where the value could not be read
    pub values: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterChange {
    pub name: String,
    pub from: Option<String>,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub snapshot_id: String,
    pub changes: Vec<ParameterChange>,
    /// Writes that failed with a non-critical reason (parameter absent from this kernel)
    pub skipped: Vec<String>,
    pub store_written: bool,
    pub score: f64,
    pub persistence_verified: bool,
    pub reboot_pending: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupOutcome {
    pub group: String,
    pub dry_run: bool,
    pub applied: Vec<String>,
    pub failed: Vec<String>,
}

impl GroupOutcome {
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditState {
    pub current: String,
    pub expected: String,
    pub compliant: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFileInfo {
    pub path: PathBuf,
    pub modified: Option<DateTime<Utc>>,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAudit {
    pub audited_at: DateTime<Utc>,
    pub current_state: BTreeMap<String, AuditState>,
    pub store: Option<StoreFileInfo>,
    /// Names whose live value differs from the desired one
    pub drift: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestChangeOutcome {
    pub name: String,
    pub test_value: String,
    pub original: String,
    pub applied: bool,
    pub reverted: bool,
    pub error: Option<String>,
}

// ============================================================================
// MANAGER
// ============================================================================

pub struct ComplianceParameterManager<B: ParameterBackend> {
    specs: Vec<ParameterSpec>,
    backend: B,
    settings: ParameterSettings,
    identity: Arc<dyn IdentityResolver>,
}

impl<B: ParameterBackend> ComplianceParameterManager<B> {
    pub fn new(specs: Vec<ParameterSpec>, backend: B, settings: ParameterSettings) -> Self {
        Self {
            specs,
            backend,
            settings,
            identity: Arc::from(default_resolver()),
        }
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityResolver>) -> Self {
        self.identity = identity;
        self
    }

    pub fn specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    // ------------------------------------------------------------------------
    // Analyses
    // ------------------------------------------------------------------------

    /// Live read of every spec; never cached
    pub fn validate_current(&self) -> ValidationSummary {
        let results = self
            .specs
            .iter()
            .map(|spec| match self.backend.read(&spec.name) {
                Ok(current) => {
                    let compliant = spec.is_satisfied_by(&current);
                    if !compliant {
                        log_debug!(
                            "Parameter drift",
                            "name" => spec.name,
                            "current" => current,
                            "expected" => spec.desired
                        );
                    }
                    ParameterValidationResult {
                        name: spec.name.clone(),
                        desired: spec.desired.clone(),
                        current: Some(current),
                        compliant,
                        error: None,
                    }
                }
                Err(e) => ParameterValidationResult {
                    name: spec.name.clone(),
                    desired: spec.desired.clone(),
                    current: None,
                    compliant: false,
                    error: Some(e.to_string()),
                },
            })
            .collect();

        let summary = ValidationSummary { results };
        log_info!(
            "Parameter validation complete",
            "compliant" => summary.compliant().len(),
            "non_compliant" => summary.non_compliant().len(),
            "unreadable" => summary.unreadable().len()
        );
        summary
    }

    /// Persistence sources in load order: listed files, then `*.conf` of each directory sorted by name
    pub fn persistence_sources(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .settings
            .persistence_files
            .iter()
            .filter(|p| p.is_file())
            .cloned()
            .collect();

        for dir in &self.settings.persistence_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            let mut confs: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().map(|x| x == "conf").unwrap_or(false))
                .collect();
            confs.sort();
            files.extend(confs);
        }

        if self.settings.store_path.is_file() && !files.contains(&self.settings.store_path) {
            files.push(self.settings.store_path.clone());
        }
        files
    }

    pub fn verify_persistence(&self) -> PersistenceReport {
        let mut report = PersistenceReport {
            config_files: self.persistence_sources(),
            ..PersistenceReport::default()
        };

        for file in &report.config_files {
            let text = match std::fs::read_to_string(file) {
                Ok(text) => text,
                Err(e) => {
                    log_warning!(&format!("Cannot read {}: {}", file.display(), e));
                    continue;
                }
            };
            for (name, value) in parse_assignments(&text) {
                if self.specs.iter().any(|s| s.name == name) {
                    report.found.entry(name).or_default().push(PersistedValue {
                        file: file.clone(),
                        value,
                    });
                }
            }
        }

        for spec in &self.specs {
            let occurrences = report.found.get(&spec.name).map(Vec::as_slice).unwrap_or(&[]);
            if !occurrences.iter().any(|o| values_match(&o.value, &spec.desired)) {
                report.missing.push(spec.name.clone());
            }
            if occurrences.iter().any(|o| !values_match(&o.value, &spec.desired)) {
                report.contradicted.push(spec.name.clone());
            }
        }

        if !report.missing.is_empty() {
            log_warning!(
                "Parameters will not persist across reboot",
                "missing" => report.missing.len()
            );
        }
        report
    }

    pub fn detect_reboot_requirements(&self) -> RebootAnalysis {
        let (require_reboot, runtime): (Vec<_>, Vec<_>) =
            self.specs.iter().partition(|s| s.reboot_required);
        RebootAnalysis {
            require_reboot: require_reboot.into_iter().map(|s| s.name.clone()).collect(),
            runtime: runtime.into_iter().map(|s| s.name.clone()).collect(),
        }
    }

    /// Documented conflicts plus probe-based findings. Advisory only.
    pub fn detect_conflicts(&self) -> Vec<ConflictFinding> {
        let mut findings = Vec::new();
        for spec in &self.specs {
            if let Some(note) = &spec.conflict {
                findings.push(ConflictFinding {
                    name: spec.name.clone(),
                    desired: spec.desired.clone(),
                    description: note.description.clone(),
                    warning: note.warning.clone(),
                    source: ConflictSource::Documented,
                });
            }
            if let Some(probe) = spec.probe {
                if self.backend.probe(probe) == Some(true) {
                    findings.push(ConflictFinding {
                        name: spec.name.clone(),
                        desired: spec.desired.clone(),
                        description: "Host configuration contradicts the desired value".to_string(),
                        warning: probe.warning().to_string(),
                        source: ConflictSource::Observed,
                    });
                }
            }
        }

        for finding in &findings {
            log_warning!(&finding.warning, "name" => finding.name);
        }
        findings
    }

    pub fn assess_performance_impact(&self) -> ImpactAssessment {
        let mut high = Vec::new();
        let mut medium = Vec::new();
        let mut low = Vec::new();
        let mut undocumented = Vec::new();

        for spec in &self.specs {
            let Some(impact) = &spec.impact else {
                undocumented.push(spec.name.clone());
                continue;
            };
            let entry = ImpactEntry {
                name: spec.name.clone(),
                desired: spec.desired.clone(),
                level: impact.level,
                rationale: impact.rationale.clone(),
                mitigation: impact.mitigation.clone(),
            };
            match impact.level {
                ImpactLevel::High => high.push(entry),
                ImpactLevel::Medium => medium.push(entry),
                ImpactLevel::Low => low.push(entry),
            }
        }

        let overall = ImpactAssessment::overall_for(high.len(), medium.len());
        ImpactAssessment {
            high,
            medium,
            low,
            undocumented,
            overall,
        }
    }

    pub fn generate_compliance_report(&self) -> ComplianceReport {
        ComplianceReport::assemble(
            self.validate_current(),
            self.verify_persistence(),
            self.detect_reboot_requirements(),
            self.detect_conflicts(),
            self.assess_performance_impact(),
        )
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    pub fn create_snapshot(&self) -> ParameterSnapshot {
        let values = self
            .specs
            .iter()
            .map(|spec| {
                let value = self.backend.read(&spec.name).ok();
                if value.is_none() {
                    log_debug!("Parameter not captured in snapshot", "name" => spec.name);
                }
                (spec.name.clone(), value)
            })
            .collect();

        ParameterSnapshot {
            snapshot_id: format!("param_snapshot_{}", chrono::Local::now().format("%Y%m%d_%H%M%S")),
            taken_at: Utc::now(),
            values,
        }
    }

    /// Write back every captured value that differs from the live one;
    /// uncaptured values are skipped
    pub fn restore_from_snapshot(&self, snapshot: &ParameterSnapshot) -> Result<usize, ParameterError> {
        let mut restored = 0;
        let mut failed = Vec::new();

        for (name, value) in &snapshot.values {
            let Some(value) = value else {
                continue;
            };
            if self.backend.read(name).map(|live| values_match(&live, value)).unwrap_or(false) {
                continue;
            }
            match self.backend.write(name, value) {
                Ok(()) => restored += 1,
                Err(e) => {
                    log_error!(parameters::SNAPSHOT_RESTORE_FAILED, &e.to_string(), "name" => name);
                    failed.push(name.clone());
                }
            }
        }

        if failed.is_empty() {
            log_success!(
                success::PARAMETER_SNAPSHOT_RESTORED,
                &format!("Restored snapshot {}", snapshot.snapshot_id),
                "restored" => restored
            );
            Ok(restored)
        } else {
            Err(ParameterError::RestoreIncomplete {
                snapshot_id: snapshot.snapshot_id.clone(),
                failed,
            })
        }
    }

    // ------------------------------------------------------------------------
    // Apply
    // ------------------------------------------------------------------------

    /// Snapshot, set every drifted spec, persist, reload; on any critical error
    /// restore the snapshot when `enable_rollback` is set
    pub fn apply_all(&self, enable_rollback: bool) -> Result<ApplyOutcome, ParameterError> {
        let snapshot = self.create_snapshot();
        log_info!("Applying parameters", "count" => self.specs.len(), "snapshot" => snapshot.snapshot_id);

        self.log_analyses();

        let mut errors = Vec::new();
        let mut changes = Vec::new();
        let mut skipped = Vec::new();

        for spec in &self.specs {
            let before = snapshot.values.get(&spec.name).cloned().flatten();
            if before.as_deref().map(|v| spec.is_satisfied_by(v)).unwrap_or(false) {
                continue;
            }
            match self.backend.write(&spec.name, &spec.desired) {
                Ok(()) => changes.push(ParameterChange {
                    name: spec.name.clone(),
                    from: before,
                    to: spec.desired.clone(),
                }),
                Err(e) if before.is_none() => {
                    log_warning!(&format!("Parameter not available on this host: {}", e));
                    skipped.push(spec.name.clone());
                }
                Err(e) => {
                    log_error!(parameters::APPLY_FAILED, &e.to_string(), "name" => spec.name);
                    errors.push(e.to_string());
                }
            }
        }

        let store_written = match self.persist(&snapshot.snapshot_id, &skipped) {
            Ok(written) => written,
            Err(e) => {
                log_error!(parameters::PERSIST_FAILED, &e.to_string());
                errors.push(e.to_string());
                false
            }
        };

        if errors.is_empty() {
            if let Err(e) = self.backend.reload(&self.settings.store_path) {
                log_error!(parameters::RELOAD_FAILED, &e.to_string());
                errors.push(e.to_string());
            }
        }

        if !errors.is_empty() {
            let rolled_back = if enable_rollback {
                log_warning!("Critical parameter errors; restoring previous values", "errors" => errors.len());
                self.restore_from_snapshot(&snapshot)?;
                true
            } else {
                false
            };
            return Err(ParameterError::ApplyFailed { errors, rolled_back });
        }

        let final_state = self.validate_current();
        let persistence = self.verify_persistence();
        let reboot_pending = changes
            .iter()
            .filter(|c| self.specs.iter().any(|s| s.name == c.name && s.reboot_required))
            .map(|c| c.name.clone())
            .collect();

        log_success!(
            success::PARAMETERS_APPLIED,
            "Parameters applied",
            "changed" => changes.len(),
            "score" => format!("{:.1}", final_state.score())
        );

        Ok(ApplyOutcome {
            snapshot_id: snapshot.snapshot_id,
            changes,
            skipped,
            store_written,
            score: final_state.score(),
            persistence_verified: persistence.verified(),
            reboot_pending,
        })
    }

    fn log_analyses(&self) {
        let impact = self.assess_performance_impact();
        if impact.overall == ImpactLevel::High {
            for entry in &impact.high {
                log_warning!(
                    &format!("High impact: {} ({})", entry.rationale, entry.mitigation),
                    "name" => entry.name
                );
            }
        }

        self.detect_conflicts();

        let reboot = self.detect_reboot_requirements();
        if reboot.reboot_recommended() {
            log_warning!(
                "Reboot required for some parameters to take full effect",
                "count" => reboot.require_reboot.len()
            );
        }
    }

    /// Write the store unless its assignments already match; returns whether it was written.
    /// Names in `absent` do not exist on this host and are left out.
    fn persist(&self, snapshot_id: &str, absent: &[String]) -> Result<bool, ParameterError> {
        let path = &self.settings.store_path;
        let stored: Vec<ParameterSpec> = self
            .specs
            .iter()
            .filter(|s| !absent.contains(&s.name))
            .cloned()
            .collect();
        let desired: Vec<(String, String)> = stored
            .iter()
            .map(|s| (s.name.clone(), s.desired.clone()))
            .collect();

        if let Ok(existing) = std::fs::read_to_string(path) {
            if parse_assignments(&existing) == desired {
                log_debug!("Parameter store already current", "path" => path.display());
                return Ok(false);
            }
        }

        let content = render_store(&stored, &StoreHeader::new(Some(snapshot_id)));
        let warnings = atomic_write(
            path,
            content.as_bytes(),
            &FileAttributes::default(),
            self.identity.as_ref(),
        )
        .map_err(|e| ParameterError::PersistFailed {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        for warning in warnings {
            log_warning!(&warning, "path" => path.display());
        }
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub fn groups(&self) -> BTreeMap<&'static str, Vec<&ParameterSpec>> {
        GROUPS
            .iter()
            .map(|group| {
                let members = self.specs.iter().filter(|s| s.group == *group).collect();
                (*group, members)
            })
            .collect()
    }

    /// Set only the specs of one group. Dry run reports what would be set.
    pub fn apply_group(&self, group: &str, dry_run: bool) -> Result<GroupOutcome, ParameterError> {
        if !GROUPS.contains(&group) {
            log_error!(parameters::UNKNOWN_GROUP, &format!("Unknown parameter group: {}", group));
            return Err(ParameterError::UnknownGroup {
                group: group.to_string(),
            });
        }

        let members: Vec<&ParameterSpec> = self.specs.iter().filter(|s| s.group == group).collect();
        let mut outcome = GroupOutcome {
            group: group.to_string(),
            dry_run,
            applied: Vec::new(),
            failed: Vec::new(),
        };

        for spec in members {
            if dry_run {
                log_info!(&format!("[DRY RUN] Would set {} = {}", spec.name, spec.desired));
                outcome.applied.push(spec.name.clone());
                continue;
            }
            match self.backend.write(&spec.name, &spec.desired) {
                Ok(()) => outcome.applied.push(spec.name.clone()),
                Err(e) => {
                    log_error!(parameters::APPLY_FAILED, &e.to_string(), "group" => group);
                    outcome.failed.push(spec.name.clone());
                }
            }
        }

        log_info!(
            "Parameter group processed",
            "group" => group,
            "applied" => outcome.applied.len(),
            "failed" => outcome.failed.len()
        );
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Audit and testing
    // ------------------------------------------------------------------------

    pub fn audit_history(&self) -> ParameterAudit {
        let mut current_state = BTreeMap::new();
        for spec in &self.specs {
            if let Ok(current) = self.backend.read(&spec.name) {
                let compliant = spec.is_satisfied_by(&current);
                current_state.insert(
                    spec.name.clone(),
                    AuditState {
                        current,
                        expected: spec.desired.clone(),
                        compliant,
                    },
                );
            }
        }

        let store = std::fs::metadata(&self.settings.store_path)
            .ok()
            .map(|meta| StoreFileInfo {
                path: self.settings.store_path.clone(),
                modified: meta.modified().ok().map(DateTime::<Utc>::from),
                size: meta.len(),
            });

        let drift = current_state
            .iter()
            .filter(|(_, state)| !state.compliant)
            .map(|(name, _)| name.clone())
            .collect();

        ParameterAudit {
            audited_at: Utc::now(),
            current_state,
            store,
            drift,
        }
    }

    /// Set `name` to `value`, hold for `hold`, then put the original back
    pub fn test_change(&self, name: &str, value: &str, hold: Duration) -> Result<TestChangeOutcome, ParameterError> {
        let original = self.backend.read(name)?;
        let mut outcome = TestChangeOutcome {
            name: name.to_string(),
            test_value: value.to_string(),
            original: original.clone(),
            applied: false,
            reverted: false,
            error: None,
        };

        if let Err(e) = self.backend.write(name, value) {
            outcome.error = Some(e.to_string());
            return Ok(outcome);
        }
        outcome.applied = true;

        std::thread::sleep(hold);

        match self.backend.write(name, &original) {
            Ok(()) => outcome.reverted = true,
            Err(e) => {
                log_error!(
                    parameters::SNAPSHOT_RESTORE_FAILED,
                    &format!("Could not revert {} to {}: {}", name, original, e)
                );
                outcome.error = Some(e.to_string());
            }
        }
        Ok(outcome)
    }
}
