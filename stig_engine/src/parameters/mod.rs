//! Declarative parameter compliance
//!
//! A parameter set is a list of [`ParameterSpec`]s, each naming a key, the
//! value policy requires and what is known about changing it. The manager
//! reads live values through a [`ParameterBackend`], scores drift, persists
//! the desired values to a generated store file and applies them with a
//! live-value snapshot to fall back on.

pub mod backend;
pub mod catalog;
pub mod error;
pub mod manager;
pub mod render;
pub mod report;
pub mod spec;

pub use backend::{MemoryBackend, ParameterBackend, SysctlBackend};
pub use catalog::ubuntu_kernel_catalog;
pub use error::ParameterError;
pub use manager::{
    ApplyOutcome, AuditState, ComplianceParameterManager, GroupOutcome, ParameterAudit,
    ParameterChange, ParameterSnapshot, StoreFileInfo, TestChangeOutcome,
};
pub use render::{parse_assignments, render_store, StoreHeader};
pub use report::{
    ComplianceReport, ConflictFinding, ConflictSource, Grade, ImpactAssessment, ImpactEntry,
    ParameterValidationResult, PersistenceReport, Priority, RebootAnalysis, Recommendation,
    ValidationSummary,
};
pub use spec::{
    group_for, values_match, ConflictNote, ImpactLevel, LiveProbe, ParameterSpec,
    PerformanceImpact, GROUPS, GROUP_IPV4, GROUP_IPV6, GROUP_KERNEL, GROUP_NETWORK,
};
