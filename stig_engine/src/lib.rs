//! # STIG Remediation Engine
//!
//! Applies hardening controls to a host with a pre-flight gate, a recovery
//! point taken before any mutation, an error budget per run, native syntax
//! validation of the touched configuration and automatic rollback. The
//! [`coordinator`] fans the same run out to many hosts.

pub mod config;
pub mod controls;
pub mod coordinator;
pub mod files;
pub mod identity;
pub mod orchestrator;
pub mod parameters;
pub mod preflight;
pub mod recovery;
pub mod transport;
pub mod validation;

pub use config::{ConfigError, EngineConfig, ForceFlags};
pub use orchestrator::{RemediationOrchestrator, RunReport, TerminalState};

pub mod prelude {
    pub use crate::config::{CoordinatorConfig, EngineConfig, ForceFlags};

    pub use crate::controls::{
        Category, CommandControl, Control, ControlCatalog, ControlContext, ControlError,
        ControlOutcome, FileControl, ParameterGroupControl, ParameterSelection,
    };

    pub use crate::coordinator::{
        CancellationToken, HostDescriptor, HostExecutionResult, HostFailureKind,
        MultiHostCoordinator, MultiHostReport, SerialDecision,
    };

    pub use crate::orchestrator::{
        OrchestratorError, RemediationOrchestrator, RunPhase, RunReport, TerminalState,
    };

    pub use crate::parameters::{
        ComplianceParameterManager, ComplianceReport, ParameterBackend, ParameterSpec,
        SysctlBackend,
    };

    pub use crate::preflight::{PreflightReport, PreflightValidator};
    pub use crate::recovery::{RecoveryPoint, RecoveryPointManager};

    pub use crate::transport::{
        CommandLine, CommandOutput, ExecOptions, LocalTransport, Transport, TransportError,
        TransportFactory,
    };

    pub use crate::validation::{ConfigPostValidator, ValidationOutcome};
}
