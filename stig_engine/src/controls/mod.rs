//! # Remediation Controls
//!
//! A control is one leaf hardening action: run some commands, write a file,
//! or bring a parameter group into compliance. Controls are grouped by
//! severity [`Category`] and applied by the orchestrator.

pub mod catalog;
pub mod command;
pub mod file;
pub mod parameter;

pub use catalog::{CatalogError, ControlCatalog};
pub use command::CommandControl;
pub use file::FileControl;
pub use parameter::{ParameterGroupControl, ParameterSelection};

use crate::config::EngineConfig;
use crate::identity::IdentityResolver;
use crate::parameters::{ParameterBackend, ParameterError, ParameterSpec};
use crate::transport::{Transport, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use stig_runtime::logging::codes::orchestration;
use stig_runtime::Code;

// ============================================================================
// CATEGORY
// ============================================================================

/// Severity tier. Lower tiers are more severe and always run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "cat1")]
    CatI,
    #[serde(rename = "cat2")]
    CatII,
    #[serde(rename = "cat3")]
    CatIII,
}

impl Category {
    pub fn all() -> &'static [Category] {
        &[Category::CatI, Category::CatII, Category::CatIII]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::CatI => "CAT I",
            Category::CatII => "CAT II",
            Category::CatIII => "CAT III",
        }
    }

    /// Parse `cat1`, `CAT I`, `1` and similar spellings
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.trim_start_matches("cat") {
            "1" | "i" => Some(Category::CatI),
            "2" | "ii" => Some(Category::CatII),
            "3" | "iii" => Some(Category::CatIII),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CONTEXT AND OUTCOME
// ============================================================================

/// What a control may use while applying itself
pub struct ControlContext<'a> {
    pub transport: &'a dyn Transport,
    pub parameters: &'a dyn ParameterBackend,
    pub identity: Arc<dyn IdentityResolver>,
    pub config: &'a EngineConfig,
}

impl<'a> ControlContext<'a> {
    pub fn dry_run(&self) -> bool {
        self.config.dry_run
    }

    pub fn timeout(&self) -> Duration {
        self.config.command_timeout()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlOutcome {
    /// False when the host was already compliant and nothing was done
    pub applied: bool,
    pub changes: Vec<String>,
    pub warnings: Vec<String>,
}

impl ControlOutcome {
    pub fn already_compliant() -> Self {
        Self::default()
    }

    pub fn changed(change: impl Into<String>) -> Self {
        Self {
            applied: true,
            changes: vec![change.into()],
            warnings: Vec::new(),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum ControlError {
    #[error("{control}: '{command}' failed: {reason}")]
    CommandFailed {
        control: String,
        command: String,
        reason: String,
    },

    #[error("{control}: {source}")]
    Transport {
        control: String,
        #[source]
        source: TransportError,
    },

    #[error("{control}: cannot write {path}: {reason}")]
    FileWrite {
        control: String,
        path: PathBuf,
        reason: String,
    },

    #[error("{control}: {source}")]
    Parameter {
        control: String,
        #[source]
        source: ParameterError,
    },
}

impl ControlError {
    pub fn control(&self) -> &str {
        match self {
            ControlError::CommandFailed { control, .. }
            | ControlError::Transport { control, .. }
            | ControlError::FileWrite { control, .. }
            | ControlError::Parameter { control, .. } => control,
        }
    }

    /// Host left in a state that only a full restore can fix
    pub fn is_critical(&self) -> bool {
        match self {
            ControlError::Parameter { source, .. } => source.is_critical(),
            ControlError::Transport { source, .. } => source.is_session_fatal(),
            _ => false,
        }
    }

    pub fn code(&self) -> Code {
        match self {
            ControlError::Transport { source, .. } => source.code(),
            ControlError::Parameter { source, .. } => source.code(),
            _ => orchestration::CONTROL_FAILED,
        }
    }
}

// ============================================================================
// CONTROL TRAIT
// ============================================================================

/// One remediation action
pub trait Control: Send + Sync {
    /// Stable identifier such as a STIG rule id
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    fn category(&self) -> Category;

    /// Controls that can lock operators out or break services; skipped unless forced
    fn high_risk(&self) -> bool {
        false
    }

    /// Live parameters this control may change, so they can be snapshotted first
    fn parameter_specs(&self) -> &[ParameterSpec] {
        &[]
    }

    /// Bring the host into compliance. Honors `ctx.dry_run()`.
    fn apply(&self, ctx: &ControlContext<'_>) -> Result<ControlOutcome, ControlError>;
}
