use std::path::PathBuf;
use stig_runtime::logging::codes::recovery;
use stig_runtime::Code;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RecoveryError {
    #[error("Recovery storage {path} unavailable: {reason}")]
    StorageUnavailable { path: PathBuf, reason: String },

    #[error("Cannot write manifest {path}: {reason}")]
    ManifestWrite { path: PathBuf, reason: String },

    #[error("Manifest {path} is unreadable: {reason}")]
    ManifestInvalid { path: PathBuf, reason: String },

    #[error("Recovery point not found: {id}")]
    NotFound { id: String },

    #[error("Invalid recovery point id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("No recovery points exist under {root}")]
    NoRecoveryPoints { root: PathBuf },

    /// Some manifest entries could not be put back. The host is in a mixed state.
    #[error("Restore of {id} incomplete: {} item(s) failed", failed.len())]
    RestoreIncomplete {
        id: String,
        restored: Vec<String>,
        failed: Vec<(String, String)>,
    },

    #[error("Cannot remove recovery point {id}: {reason}")]
    PruneFailed { id: String, reason: String },
}

impl RecoveryError {
    pub fn is_critical(&self) -> bool {
        matches!(self, RecoveryError::RestoreIncomplete { .. })
    }

    pub fn code(&self) -> Code {
        match self {
            RecoveryError::StorageUnavailable { .. } => recovery::CAPTURE_FAILED,
            RecoveryError::ManifestWrite { .. } => recovery::MANIFEST_WRITE_FAILED,
            RecoveryError::ManifestInvalid { .. } | RecoveryError::RestoreIncomplete { .. } => {
                recovery::RESTORE_FAILED
            }
            RecoveryError::NotFound { .. }
            | RecoveryError::InvalidId { .. }
            | RecoveryError::NoRecoveryPoints { .. } => {
                recovery::NOT_FOUND
            }
            RecoveryError::PruneFailed { .. } => recovery::PRUNE_FAILED,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            RecoveryError::RestoreIncomplete { id, failed, .. } => format!(
                "CRITICAL: recovery point {} was only partly restored. Restore these manually: {}",
                id,
                failed
                    .iter()
                    .map(|(path, _)| path.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            other => other.to_string(),
        }
    }
}
