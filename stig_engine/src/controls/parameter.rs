//! Controls backed by the parameter compliance manager

use super::{Category, Control, ControlContext, ControlError, ControlOutcome};
use crate::parameters::{ComplianceParameterManager, ParameterSpec};
use stig_runtime::log_info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterSelection {
    /// Every spec, applied, persisted and reloaded as one set
    All,
    /// Live values of one group only; the persisted store is left alone
    Group(String),
}

pub struct ParameterGroupControl {
    id: String,
    description: String,
    category: Category,
    high_risk: bool,
    specs: Vec<ParameterSpec>,
    selection: ParameterSelection,
}

impl ParameterGroupControl {
    pub fn new(id: &str, description: &str, category: Category, specs: Vec<ParameterSpec>) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            category,
            high_risk: false,
            specs,
            selection: ParameterSelection::All,
        }
    }

    pub fn for_group(mut self, group: &str) -> Self {
        self.selection = ParameterSelection::Group(group.to_string());
        self
    }

    pub fn high_risk(mut self) -> Self {
        self.high_risk = true;
        self
    }

    pub fn selection(&self) -> &ParameterSelection {
        &self.selection
    }

    fn parameter_error(&self, source: crate::parameters::ParameterError) -> ControlError {
        ControlError::Parameter {
            control: self.id.clone(),
            source,
        }
    }
}

impl Control for ParameterGroupControl {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn category(&self) -> Category {
        self.category
    }

    fn high_risk(&self) -> bool {
        self.high_risk
    }

    fn parameter_specs(&self) -> &[ParameterSpec] {
        &self.specs
    }

    fn apply(&self, ctx: &ControlContext<'_>) -> Result<ControlOutcome, ControlError> {
        let manager = ComplianceParameterManager::new(
            self.specs.clone(),
            ctx.parameters,
            ctx.config.parameters.clone(),
        )
        .with_identity(ctx.identity.clone());

        match &self.selection {
            ParameterSelection::Group(group) => {
                let result = manager
                    .apply_group(group, ctx.dry_run())
                    .map_err(|e| self.parameter_error(e))?;
                if let Some(name) = result.failed.first() {
                    return Err(ControlError::CommandFailed {
                        control: self.id.clone(),
                        command: format!("set {}", name),
                        reason: format!("{} of {} parameters failed", result.failed.len(), result.failed.len() + result.applied.len()),
                    });
                }
                Ok(ControlOutcome {
                    applied: !result.applied.is_empty(),
                    changes: result.applied.iter().map(|n| format!("set {}", n)).collect(),
                    warnings: Vec::new(),
                })
            }
            ParameterSelection::All if ctx.dry_run() => {
                let summary = manager.validate_current();
                let drifted: Vec<String> = summary
                    .results
                    .iter()
                    .filter(|r| !r.compliant)
                    .map(|r| format!("would set {} = {}", r.name, r.desired))
                    .collect();
                log_info!("[DRY RUN] Parameter drift", "control" => self.id, "count" => drifted.len());
                Ok(ControlOutcome {
                    applied: !drifted.is_empty(),
                    changes: drifted,
                    warnings: Vec::new(),
                })
            }
            ParameterSelection::All => {
                let result = manager
                    .apply_all(ctx.config.rollback_enabled())
                    .map_err(|e| self.parameter_error(e))?;

                let mut changes: Vec<String> = result
                    .changes
                    .iter()
                    .map(|c| format!("{}: {} -> {}", c.name, c.from.as_deref().unwrap_or("unset"), c.to))
                    .collect();
                if result.store_written {
                    changes.push(format!("persisted to {}", ctx.config.parameters.store_path.display()));
                }

                let mut warnings: Vec<String> = result
                    .skipped
                    .iter()
                    .map(|n| format!("{} not available on this kernel", n))
                    .collect();
                if !result.reboot_pending.is_empty() {
                    warnings.push(format!(
                        "reboot required for: {}",
                        result.reboot_pending.join(", ")
                    ));
                }

                Ok(ControlOutcome {
                    applied: !changes.is_empty(),
                    changes,
                    warnings,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, ParameterSettings};
    use crate::identity::NoopIdentityResolver;
    use crate::parameters::{MemoryBackend, ParameterError, GROUP_IPV4};
    use crate::transport::ScriptedTransport;
    use std::sync::Arc;

    fn specs() -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new("net.ipv4.tcp_syncookies", "1"),
            ParameterSpec::new("kernel.randomize_va_space", "2").requires_reboot(),
        ]
    }

    fn config(dir: &std::path::Path) -> EngineConfig {
        EngineConfig::default().with_parameters(ParameterSettings {
            store_path: dir.join("99-stig.conf"),
            persistence_files: Vec::new(),
            persistence_dirs: Vec::new(),
        })
    }

    fn apply(control: &ParameterGroupControl, backend: &MemoryBackend, config: &EngineConfig) -> Result<ControlOutcome, ControlError> {
        let transport = ScriptedTransport::new("h");
        let ctx = ControlContext {
            transport: &transport,
            parameters: backend,
            identity: Arc::new(NoopIdentityResolver),
            config,
        };
        control.apply(&ctx)
    }

    #[test]
    fn test_full_set_applies_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new()
            .with_value("net.ipv4.tcp_syncookies", "0")
            .with_value("kernel.randomize_va_space", "2");
        let control = ParameterGroupControl::new("kernel-params", "Kernel parameters", Category::CatII, specs());

        let outcome = apply(&control, &backend, &config(dir.path())).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.changes[0], "net.ipv4.tcp_syncookies: 0 -> 1");
        assert!(outcome.changes[1].starts_with("persisted to"));
        assert!(outcome.warnings.is_empty());
        assert!(dir.path().join("99-stig.conf").exists());
    }

    #[test]
    fn test_dry_run_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new()
            .with_value("net.ipv4.tcp_syncookies", "0")
            .with_value("kernel.randomize_va_space", "2");
        let control = ParameterGroupControl::new("kernel-params", "Kernel parameters", Category::CatII, specs());

        let outcome = apply(&control, &backend, &config(dir.path()).with_dry_run()).unwrap();
        assert_eq!(outcome.changes, vec!["would set net.ipv4.tcp_syncookies = 1".to_string()]);
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn test_group_selection() {
        let dir = tempfile::tempdir().unwrap();
        let backend = MemoryBackend::new();
        let control = ParameterGroupControl::new("ipv4", "IPv4 hardening", Category::CatII, specs())
            .for_group(GROUP_IPV4);

        let outcome = apply(&control, &backend, &config(dir.path())).unwrap();
        assert_eq!(outcome.changes, vec!["set net.ipv4.tcp_syncookies".to_string()]);
        assert!(!dir.path().join("99-stig.conf").exists());

        let unknown = ParameterGroupControl::new("x", "x", Category::CatII, specs()).for_group("bogus");
        let err = apply(&unknown, &backend, &config(dir.path())).unwrap_err();
        assert_matches::assert_matches!(err, ControlError::Parameter { source: ParameterError::UnknownGroup { .. }, .. });
    }
}
