use std::path::PathBuf;
use stig_engine::config::ConfigError;
use stig_engine::controls::CatalogError;
use stig_engine::coordinator::CoordinatorError;
use stig_engine::parameters::ParameterError;
use stig_engine::preflight::PreflightError;
use stig_engine::recovery::RecoveryError;
use stig_engine::validation::ValidationError;
use stig_runtime::logging::codes::system;
use stig_runtime::Code;

/// Everything a subcommand can fail with
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error(transparent)]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("Invalid value for --{argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("Cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl CliError {
    pub fn code(&self) -> Code {
        match self {
            CliError::Config(_) | CliError::InvalidArgument { .. } => system::CONFIGURATION_INVALID,
            CliError::Catalog(e) => e.code(),
            CliError::Recovery(e) => e.code(),
            CliError::Parameter(e) => e.code(),
            CliError::Preflight(e) => e.code(),
            CliError::Validation(e) => e.code(),
            CliError::Coordinator(e) => e.code(),
            CliError::Output { .. } => system::INTERNAL_ERROR,
            CliError::Logging(_) => system::INITIALIZATION_FAILURE,
        }
    }

    /// Failures that may have left the host half-changed
    pub fn is_critical(&self) -> bool {
        match self {
            CliError::Recovery(e) => e.is_critical(),
            CliError::Parameter(e) => e.is_critical(),
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            CliError::Config(e) => e.user_message(),
            CliError::Recovery(e) => e.user_message(),
            CliError::Preflight(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}
