//! # Post-change Validation
//!
//! After mutation, every generated artifact class is run through its native
//! syntax check. Checkers are independent and always all run; missing
//! optional artifacts only produce warnings.

pub mod checkers;

pub use checkers::{GrubChecker, PamChecker, SshdChecker, SudoersChecker};

use crate::config::{EngineConfig, ValidationSettings};
use crate::transport::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stig_runtime::logging::codes::{success, validation};
use stig_runtime::{log_error, log_info, log_success, log_warning, Code};

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("{artifact} is invalid: {reason}")]
    ArtifactInvalid { artifact: String, reason: String },

    #[error("{artifact} not found at {path}")]
    ArtifactMissing { artifact: String, path: String },

    #[error("Cannot check {artifact}: {reason}")]
    CheckerFailed { artifact: String, reason: String },

    #[error("Post-change validation failed with {} error(s)", errors.len())]
    Failed { errors: Vec<String> },
}

impl ValidationError {
    pub fn code(&self) -> Code {
        match self {
            ValidationError::CheckerFailed { .. } => validation::CHECKER_UNAVAILABLE,
            _ => validation::ARTIFACT_INVALID,
        }
    }

    pub(crate) fn from_transport(artifact: &str, error: TransportError) -> Self {
        ValidationError::CheckerFailed {
            artifact: artifact.to_string(),
            reason: error.to_string(),
        }
    }
}

// ============================================================================
// FINDINGS
// ============================================================================

/// What one checker found for its artifact class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactFindings {
    pub artifact: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ArtifactFindings {
    pub fn new(artifact: &str) -> Self {
        Self {
            artifact: artifact.to_string(),
            ..Default::default()
        }
    }

    pub fn error(&mut self, error: ValidationError) {
        log_error!(error.code(), &error.to_string(), "artifact" => self.artifact);
        self.errors.push(error.to_string());
    }

    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        log_warning!(&warning, "artifact" => self.artifact);
        self.warnings.push(warning);
    }

    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub all_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub artifacts: Vec<ArtifactFindings>,
}

impl ValidationOutcome {
    pub fn from_findings(artifacts: Vec<ArtifactFindings>) -> Self {
        let errors: Vec<String> = artifacts
            .iter()
            .flat_map(|a| a.errors.iter().map(move |e| format!("{}: {}", a.artifact, e)))
            .collect();
        let warnings = artifacts
            .iter()
            .flat_map(|a| a.warnings.iter().map(move |w| format!("{}: {}", a.artifact, w)))
            .collect();
        Self {
            all_valid: errors.is_empty(),
            errors,
            warnings,
            artifacts,
        }
    }

    pub fn into_result(self) -> Result<Self, ValidationError> {
        if self.all_valid {
            Ok(self)
        } else {
            Err(ValidationError::Failed {
                errors: self.errors,
            })
        }
    }
}

// ============================================================================
// CHECKER TRAIT
// ============================================================================

pub struct ValidationContext<'a> {
    pub transport: &'a dyn Transport,
    pub settings: &'a ValidationSettings,
    pub timeout: Duration,
}

impl<'a> ValidationContext<'a> {
    pub fn from_config(transport: &'a dyn Transport, config: &'a EngineConfig) -> Self {
        Self {
            transport,
            settings: &config.validation,
            timeout: config.command_timeout(),
        }
    }
}

/// Validates one artifact class
pub trait ArtifactChecker: Send + Sync {
    fn artifact(&self) -> &'static str;

    fn check(&self, ctx: &ValidationContext<'_>) -> ArtifactFindings;
}

// ============================================================================
// VALIDATOR
// ============================================================================

pub struct ConfigPostValidator {
    checkers: Vec<Box<dyn ArtifactChecker>>,
}

impl ConfigPostValidator {
    pub fn empty() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    /// Daemon config, privilege escalation, access control stack and boot loader
    pub fn standard() -> Self {
        Self::empty()
            .with_checker(SshdChecker)
            .with_checker(PamChecker)
            .with_checker(SudoersChecker)
            .with_checker(GrubChecker)
    }

    pub fn with_checker(mut self, checker: impl ArtifactChecker + 'static) -> Self {
        self.checkers.push(Box::new(checker));
        self
    }

    pub fn artifacts(&self) -> Vec<&'static str> {
        self.checkers.iter().map(|c| c.artifact()).collect()
    }

    pub fn validate_all(&self, ctx: &ValidationContext<'_>) -> ValidationOutcome {
        log_info!("Validating configurations", "checkers" => self.checkers.len());

        let findings = self.checkers.iter().map(|c| c.check(ctx)).collect();
        let outcome = ValidationOutcome::from_findings(findings);

        if outcome.all_valid {
            log_success!(
                success::VALIDATION_PASSED,
                "All configurations valid",
                "warnings" => outcome.warnings.len()
            );
        } else {
            log_error!(
                validation::ARTIFACT_INVALID,
                "Configuration validation failed",
                "errors" => outcome.errors.len()
            );
        }
        outcome
    }
}

impl Default for ConfigPostValidator {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ScriptedTransport;

    struct Fixed {
        name: &'static str,
        error: Option<&'static str>,
        warning: Option<&'static str>,
    }

    impl ArtifactChecker for Fixed {
        fn artifact(&self) -> &'static str {
            self.name
        }

        fn check(&self, _ctx: &ValidationContext<'_>) -> ArtifactFindings {
            let mut findings = ArtifactFindings::new(self.name);
            if let Some(reason) = self.error {
                findings.error(ValidationError::ArtifactInvalid {
                    artifact: self.name.to_string(),
                    reason: reason.to_string(),
                });
            }
            if let Some(warning) = self.warning {
                findings.warn(warning);
            }
            findings
        }
    }

    #[test]
    fn test_all_checkers_run_after_failure() {
        let transport = ScriptedTransport::new("h");
        let settings = ValidationSettings::default();
        let ctx = ValidationContext {
            transport: &transport,
            settings: &settings,
            timeout: Duration::from_secs(5),
        };

        let validator = ConfigPostValidator::empty()
            .with_checker(Fixed { name: "a", error: Some("bad syntax"), warning: None })
            .with_checker(Fixed { name: "b", error: None, warning: Some("odd") })
            .with_checker(Fixed { name: "c", error: Some("missing"), warning: None });

        let outcome = validator.validate_all(&ctx);
        assert!(!outcome.all_valid);
        assert_eq!(outcome.artifacts.len(), 3);
        assert_eq!(outcome.errors.len(), 2);
        assert_eq!(outcome.warnings, vec!["b: odd".to_string()]);

        let err = outcome.into_result().unwrap_err();
        assert_matches::assert_matches!(err, ValidationError::Failed { ref errors } if errors.len() == 2);
    }

    #[test]
    fn test_standard_set() {
        assert_eq!(
            ConfigPostValidator::standard().artifacts(),
            vec!["sshd_config", "pam", "sudoers", "grub"]
        );
    }
}
