//! # Engine Configuration
//!
//! One immutable [`EngineConfig`] is built up front (defaults, then an
//! optional TOML file, then `STIG_*` environment overrides) and passed by
//! reference to every component.

pub mod settings;

pub use settings::{
    CoordinatorConfig, ParameterSettings, PreflightSettings, RecoverySettings, ValidationSettings,
};

use crate::controls::Category;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stig_runtime::limits::{coordination, execution, remediation};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Invalid configuration file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ConfigError::Io { path, .. } => {
                format!("Configuration file {} could not be read", path.display())
            }
            ConfigError::Parse { path, reason } => {
                format!("Configuration file {} is malformed: {}", path.display(), reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
        }
    }
}

// ============================================================================
// FORCE FLAGS
// ============================================================================

/// Safety overrides. Each one removes a guard, so all default to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceFlags {
    /// Master switch: preflight failures are logged and bypassed
    pub enabled: bool,
    /// Control failures are recorded as warnings and do not count against the error budget
    pub ignore_errors: bool,
    pub skip_validation: bool,
    /// A recovery point is still taken, but never restored automatically
    pub no_rollback: bool,
    pub skip_preflight: bool,
    /// No recovery point is taken
    pub no_backup: bool,
    /// Accept an operating system other than the expected one
    pub override_os: bool,
    /// Apply controls flagged as high risk
    pub apply_all: bool,
}

impl ForceFlags {
    pub fn all() -> Self {
        Self {
            enabled: true,
            ignore_errors: true,
            skip_validation: true,
            no_rollback: true,
            skip_preflight: true,
            no_backup: true,
            override_os: true,
            apply_all: true,
        }
    }

    pub fn any(&self) -> bool {
        *self != Self::default()
    }

    /// Names of the active flags, for logging
    pub fn active(&self) -> Vec<&'static str> {
        [
            ("force", self.enabled),
            ("ignore_errors", self.ignore_errors),
            ("skip_validation", self.skip_validation),
            ("no_rollback", self.no_rollback),
            ("skip_preflight", self.skip_preflight),
            ("no_backup", self.no_backup),
            ("override_os", self.override_os),
            ("apply_all", self.apply_all),
        ]
        .into_iter()
        .filter(|(_, on)| *on)
        .map(|(name, _)| name)
        .collect()
    }
}

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub dry_run: bool,
    /// Categories to apply, executed in severity order regardless of listing order
    pub categories: Vec<Category>,
    /// Errors tolerated before the run aborts. Exactly this many still continues.
    pub error_threshold: usize,
    /// Fail preflight when no snapshot mechanism is detected
    pub snapshot_required: bool,
    /// Skip remediation and restore a recovery point
    pub emergency: bool,
    /// Recovery point restored in emergency mode; the most recent one when unset
    pub emergency_point: Option<String>,
    pub command_timeout_secs: u64,
    /// Target hosts for multi-host runs
    pub hosts: Vec<String>,
    pub force: ForceFlags,
    pub preflight: PreflightSettings,
    pub recovery: RecoverySettings,
    pub parameters: ParameterSettings,
    pub validation: ValidationSettings,
    pub coordinator: CoordinatorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            categories: Category::all().to_vec(),
            error_threshold: remediation::DEFAULT_MAX_FAILED_COMMANDS,
            snapshot_required: false,
            emergency: false,
            emergency_point: None,
            command_timeout_secs: execution::DEFAULT_COMMAND_TIMEOUT_SECS,
            hosts: Vec::new(),
            force: ForceFlags::default(),
            preflight: PreflightSettings::default(),
            recovery: RecoverySettings::default(),
            parameters: ParameterSettings::default(),
            validation: ValidationSettings::default(),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from TOML; missing keys take their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&text).map_err(|e| match e {
            ConfigError::Parse { reason, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                reason,
            },
            other => other,
        })
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::invalid("config", e.to_string()))
    }

    /// Apply `STIG_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply `STIG_*` overrides from an arbitrary lookup
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("STIG_DRY_RUN") {
            self.dry_run = parse_flag("STIG_DRY_RUN", &v)?;
        }
        if let Some(v) = lookup("STIG_FORCE") {
            self.force.enabled = parse_flag("STIG_FORCE", &v)?;
        }
        if let Some(v) = lookup("STIG_IGNORE_ERRORS") {
            self.force.ignore_errors = parse_flag("STIG_IGNORE_ERRORS", &v)?;
        }
        if let Some(v) = lookup("STIG_ERROR_THRESHOLD") {
            self.error_threshold = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("STIG_ERROR_THRESHOLD", format!("'{}' is not a count", v)))?;
        }
        if let Some(v) = lookup("STIG_STORAGE_ROOT") {
            self.recovery.storage_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("STIG_PARALLEL") {
            self.coordinator.parallel = parse_flag("STIG_PARALLEL", &v)?;
        }
        if let Some(v) = lookup("STIG_MAX_WORKERS") {
            self.coordinator.max_workers = v
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("STIG_MAX_WORKERS", format!("'{}' is not a count", v)))?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::invalid("categories", "at least one category is required"));
        }
        if self.command_timeout_secs < execution::MIN_TIMEOUT_SECS {
            return Err(ConfigError::invalid(
                "command_timeout_secs",
                format!("must be at least {}", execution::MIN_TIMEOUT_SECS),
            ));
        }
        if self.coordinator.max_workers == 0 || self.coordinator.max_workers > coordination::MAX_WORKERS_CEILING {
            return Err(ConfigError::invalid(
                "coordinator.max_workers",
                format!("must be between 1 and {}", coordination::MAX_WORKERS_CEILING),
            ));
        }
        if self.coordinator.remediation_timeout_secs < execution::MIN_TIMEOUT_SECS
            || self.coordinator.command_timeout_secs < execution::MIN_TIMEOUT_SECS
        {
            return Err(ConfigError::invalid("coordinator timeouts", "must be at least one second"));
        }
        if self.recovery.storage_root.as_os_str().is_empty() {
            return Err(ConfigError::invalid("recovery.storage_root", "must not be empty"));
        }
        Ok(())
    }

    // Builders

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_force(mut self, force: ForceFlags) -> Self {
        self.force = force;
        self
    }

    pub fn with_categories(mut self, categories: &[Category]) -> Self {
        self.categories = categories.to_vec();
        self
    }

    pub fn with_error_threshold(mut self, threshold: usize) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.recovery.storage_root = root.into();
        self
    }

    pub fn with_snapshot_required(mut self, required: bool) -> Self {
        self.snapshot_required = required;
        self
    }

    pub fn with_emergency(mut self, point: Option<String>) -> Self {
        self.emergency = true;
        self.emergency_point = point;
        self
    }

    pub fn with_hosts(mut self, hosts: Vec<String>) -> Self {
        self.hosts = hosts;
        self
    }

    pub fn with_preflight(mut self, settings: PreflightSettings) -> Self {
        self.preflight = settings;
        self
    }

    pub fn with_recovery(mut self, settings: RecoverySettings) -> Self {
        self.recovery = settings;
        self
    }

    pub fn with_parameters(mut self, settings: ParameterSettings) -> Self {
        self.parameters = settings;
        self
    }

    pub fn with_validation(mut self, settings: ValidationSettings) -> Self {
        self.validation = settings;
        self
    }

    pub fn with_coordinator(mut self, settings: CoordinatorConfig) -> Self {
        self.coordinator = settings;
        self
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn applies(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Selected categories in execution order
    pub fn ordered_categories(&self) -> Vec<Category> {
        let mut categories = self.categories.clone();
        categories.sort();
        categories.dedup();
        categories
    }

    /// Whether an automatic rollback may be performed
    pub fn rollback_enabled(&self) -> bool {
        !self.force.no_rollback && !self.force.no_backup
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::invalid(name, format!("'{}' is not a boolean", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(!config.dry_run);
        assert!(!config.force.any());
        assert_eq!(config.error_threshold, 10);
        assert_eq!(config.ordered_categories(), Category::all().to_vec());
        assert_eq!(config.recovery.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = EngineConfig::new()
            .with_dry_run()
            .with_categories(&[Category::CatIII, Category::CatI])
            .with_error_threshold(3)
            .with_force(ForceFlags {
                no_rollback: true,
                ..ForceFlags::default()
            });

        assert!(config.dry_run);
        assert_eq!(config.error_threshold, 3);
        assert_eq!(config.ordered_categories(), vec![Category::CatI, Category::CatIII]);
        assert!(!config.applies(Category::CatII));
        assert!(!config.rollback_enabled());
        assert_eq!(config.force.active(), vec!["no_rollback"]);
    }

    #[test]
    fn test_toml_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            dry_run = true
            categories = ["cat1"]

            [force]
            ignore_errors = true

            [coordinator]
            max_workers = 8
            "#,
        )
        .unwrap();

        assert!(config.dry_run);
        assert!(config.force.ignore_errors);
        assert_eq!(config.categories, vec![Category::CatI]);
        assert_eq!(config.coordinator.max_workers, 8);
        assert_eq!(config.parameters, ParameterSettings::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default().with_storage_root("/srv/recovery");
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_toml_str("categories = []").is_err());
        assert!(EngineConfig::from_toml_str("[coordinator]\nmax_workers = 0").is_err());
        assert!(EngineConfig::from_toml_str("dry_run = \"maybe\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("STIG_DRY_RUN", "yes"),
            ("STIG_ERROR_THRESHOLD", "4"),
            ("STIG_STORAGE_ROOT", "/tmp/rp"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides_from(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert!(config.dry_run);
        assert_eq!(config.error_threshold, 4);
        assert_eq!(config.recovery.storage_root, PathBuf::from("/tmp/rp"));

        let err = EngineConfig::default()
            .with_overrides_from(|name| (name == "STIG_MAX_WORKERS").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
