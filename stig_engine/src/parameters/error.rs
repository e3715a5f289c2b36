use std::path::PathBuf;
use stig_runtime::logging::codes::parameters;
use stig_runtime::Code;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterError {
    #[error("Cannot read {name}: {reason}")]
    ReadFailed { name: String, reason: String },

    #[error("Cannot set {name} = {value}: {reason}")]
    WriteFailed {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Cannot persist parameters to {path}: {reason}")]
    PersistFailed { path: PathBuf, reason: String },

    #[error("Reloading {path} failed: {reason}")]
    ReloadFailed { path: PathBuf, reason: String },

    #[error("Unknown parameter group: {group}")]
    UnknownGroup { group: String },

    #[error("Parameter application failed with {} error(s){}", errors.len(), if *rolled_back { "; previous values restored" } else { "" })]
    ApplyFailed { errors: Vec<String>, rolled_back: bool },

    /// Live values could not be put back; the host is in a mixed state
    #[error("Restoring parameter snapshot {snapshot_id} failed for: {}", failed.join(", "))]
    RestoreIncomplete {
        snapshot_id: String,
        failed: Vec<String>,
    },
}

impl ParameterError {
    pub fn is_critical(&self) -> bool {
        matches!(self, ParameterError::RestoreIncomplete { .. })
    }

    pub fn code(&self) -> Code {
        match self {
            ParameterError::ReadFailed { .. } => parameters::READ_FAILED,
            ParameterError::WriteFailed { .. } | ParameterError::ApplyFailed { .. } => {
                parameters::APPLY_FAILED
            }
            ParameterError::PersistFailed { .. } => parameters::PERSIST_FAILED,
            ParameterError::ReloadFailed { .. } => parameters::RELOAD_FAILED,
            ParameterError::UnknownGroup { .. } => parameters::UNKNOWN_GROUP,
            ParameterError::RestoreIncomplete { .. } => parameters::SNAPSHOT_RESTORE_FAILED,
        }
    }
}
