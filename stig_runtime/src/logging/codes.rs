//! Event codes and their classification metadata
//!
//! Every error, warning and success event emitted by the engine carries a `Code`.
//! The registry below maps each code to its category, severity and the action an
//! operator should take.

use std::collections::HashMap;
use std::sync::OnceLock;

// ============================================================================
// CODE WRAPPER TYPE
// ============================================================================

/// Universal code wrapper for both error and success codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Code(&'static str);

impl Code {
    pub const fn new(code: &'static str) -> Self {
        Self(code)
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ERROR CLASSIFICATION TYPES
// ============================================================================

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Critical = 0,
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "Critical",
            Severity::High => "High",
            Severity::Medium => "Medium",
            Severity::Low => "Low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Critical" => Some(Severity::Critical),
            "High" => Some(Severity::High),
            "Medium" => Some(Severity::Medium),
            "Low" => Some(Severity::Low),
            _ => None,
        }
    }
}

/// Complete metadata for a code
#[derive(Debug, Clone)]
pub struct CodeMetadata {
    pub code: &'static str,
    pub category: &'static str,
    pub severity: Severity,
    pub recoverable: bool,
    pub requires_halt: bool,
    pub description: &'static str,
    pub recommended_action: &'static str,
}

// ============================================================================
// CODE CONSTANTS
// ============================================================================

/// System error codes
pub mod system {
    use super::Code;

    pub const INTERNAL_ERROR: Code = Code::new("SYS001");
    pub const INITIALIZATION_FAILURE: Code = Code::new("SYS002");
    pub const CONFIGURATION_INVALID: Code = Code::new("SYS003");
}

/// Command and file transport codes
pub mod transport {
    use super::Code;

    pub const CONNECT_FAILED: Code = Code::new("TR001");
    pub const EXECUTION_FAILED: Code = Code::new("TR002");
    pub const TIMEOUT: Code = Code::new("TR003");
    pub const DELIVERY_FAILED: Code = Code::new("TR004");
    pub const ELEVATION_DENIED: Code = Code::new("TR005");
    pub const SECURITY_VIOLATION: Code = Code::new("TR006");
}

/// Pre-flight gate codes
pub mod preflight {
    use super::Code;

    pub const CHECK_FAILED: Code = Code::new("PF001");
    pub const CHECK_BYPASSED: Code = Code::new("PF002");
    pub const GATE_BLOCKED: Code = Code::new("PF003");
}

/// Recovery point codes
pub mod recovery {
    use super::Code;

    pub const CAPTURE_FAILED: Code = Code::new("RC001");
    pub const MANIFEST_WRITE_FAILED: Code = Code::new("RC002");
    pub const RESTORE_FAILED: Code = Code::new("RC003");
    pub const NOT_FOUND: Code = Code::new("RC004");
    pub const PRUNE_FAILED: Code = Code::new("RC005");
}

/// Parameter compliance codes
pub mod parameters {
    use super::Code;

    pub const READ_FAILED: Code = Code::new("PM001");
    pub const APPLY_FAILED: Code = Code::new("PM002");
    pub const PERSIST_FAILED: Code = Code::new("PM003");
    pub const RELOAD_FAILED: Code = Code::new("PM004");
    pub const SNAPSHOT_RESTORE_FAILED: Code = Code::new("PM005");
    pub const UNKNOWN_GROUP: Code = Code::new("PM006");
}

/// Post-change validation codes
pub mod validation {
    use super::Code;

    pub const ARTIFACT_INVALID: Code = Code::new("VL001");
    pub const CHECKER_UNAVAILABLE: Code = Code::new("VL002");
}

/// Orchestration codes
pub mod orchestration {
    use super::Code;

    pub const CONTROL_FAILED: Code = Code::new("OR001");
    pub const ERROR_BUDGET_EXCEEDED: Code = Code::new("OR002");
    pub const ROLLBACK_FAILED: Code = Code::new("OR003");
    pub const SNAPSHOT_REQUIRED: Code = Code::new("OR004");
    pub const RUN_FAILED: Code = Code::new("OR005");
}

/// Multi-host coordination codes
pub mod coordination {
    use super::Code;

    pub const HOST_FAILED: Code = Code::new("CO001");
    pub const HOST_CANCELLED: Code = Code::new("CO002");
    pub const WORKER_PANICKED: Code = Code::new("CO003");
}

/// Success codes
pub mod success {
    use super::Code;

    pub const OPERATION_COMPLETED: Code = Code::new("I001");
    pub const LOGGING_INITIALIZED: Code = Code::new("I002");
    pub const PREFLIGHT_PASSED: Code = Code::new("I010");
    pub const RECOVERY_POINT_CREATED: Code = Code::new("I020");
    pub const RECOVERY_POINT_RESTORED: Code = Code::new("I021");
    pub const PARAMETERS_APPLIED: Code = Code::new("I030");
    pub const PARAMETER_SNAPSHOT_RESTORED: Code = Code::new("I031");
    pub const VALIDATION_PASSED: Code = Code::new("I040");
    pub const CONTROL_APPLIED: Code = Code::new("I050");
    pub const RUN_COMPLETED: Code = Code::new("I051");
    pub const HOST_COMPLETED: Code = Code::new("I060");
}

// ============================================================================
// CODE REGISTRY
// ============================================================================

fn register(
    registry: &mut HashMap<&'static str, CodeMetadata>,
    code: Code,
    category: &'static str,
    severity: Severity,
    recoverable: bool,
    requires_halt: bool,
    description: &'static str,
    recommended_action: &'static str,
) {
    registry.insert(
        code.as_str(),
        CodeMetadata {
            code: code.as_str(),
            category,
            severity,
            recoverable,
            requires_halt,
            description,
            recommended_action,
        },
    );
}

fn get_registry() -> &'static HashMap<&'static str, CodeMetadata> {
    static REGISTRY: OnceLock<HashMap<&'static str, CodeMetadata>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        use Severity::*;
        let mut r = HashMap::new();

        register(&mut r, system::INTERNAL_ERROR, "System", Critical, false, true,
            "Internal engine error", "Report the failure with the full run log");
        register(&mut r, system::INITIALIZATION_FAILURE, "System", Critical, false, true,
            "Engine initialization failed", "Check logging and configuration setup");
        register(&mut r, system::CONFIGURATION_INVALID, "System", High, true, true,
            "Configuration rejected", "Fix the configuration file or command-line flags");

        register(&mut r, transport::CONNECT_FAILED, "Transport", High, true, false,
            "Could not establish a session with the target", "Check reachability and credentials");
        register(&mut r, transport::EXECUTION_FAILED, "Transport", Medium, true, false,
            "Command could not be executed on the target", "Inspect stderr and the command path");
        register(&mut r, transport::TIMEOUT, "Transport", High, true, false,
            "Command exceeded its timeout", "Raise the timeout or investigate the hung command");
        register(&mut r, transport::DELIVERY_FAILED, "Transport", High, true, false,
            "File delivery to the target failed", "Check free space and permissions on the target path");
        register(&mut r, transport::ELEVATION_DENIED, "Transport", High, true, false,
            "Privilege elevation was refused", "Verify sudo rights for the connecting account");
        register(&mut r, transport::SECURITY_VIOLATION, "Transport", Critical, false, true,
            "Command rejected by the execution allowlist", "Add the program to the allowlist if intended");

        register(&mut r, preflight::CHECK_FAILED, "Preflight", High, true, false,
            "A pre-flight check failed", "Fix the environment or run in force mode");
        register(&mut r, preflight::CHECK_BYPASSED, "Preflight", Medium, true, false,
            "A failed pre-flight check was bypassed by force mode", "Review the bypassed condition");
        register(&mut r, preflight::GATE_BLOCKED, "Preflight", High, true, true,
            "Pre-flight gate blocked the run", "Resolve failing checks before retrying");

        register(&mut r, recovery::CAPTURE_FAILED, "Recovery", High, true, false,
            "Could not capture an item into the recovery point", "Check read access and storage space");
        register(&mut r, recovery::MANIFEST_WRITE_FAILED, "Recovery", High, false, true,
            "Recovery manifest could not be written", "Check the recovery storage root");
        register(&mut r, recovery::RESTORE_FAILED, "Recovery", Critical, false, true,
            "Restore from recovery point failed", "Use emergency recovery mode or restore manually");
        register(&mut r, recovery::NOT_FOUND, "Recovery", High, true, false,
            "Recovery point not found", "List recovery points and pick a valid id");
        register(&mut r, recovery::PRUNE_FAILED, "Recovery", Low, true, false,
            "Expired recovery point could not be removed", "Remove the bundle manually");

        register(&mut r, parameters::READ_FAILED, "Parameters", Medium, true, false,
            "Live parameter value could not be read", "Check whether the parameter exists on this kernel");
        register(&mut r, parameters::APPLY_FAILED, "Parameters", High, true, false,
            "Parameter could not be set", "Inspect the backend error output");
        register(&mut r, parameters::PERSIST_FAILED, "Parameters", High, true, false,
            "Persisted parameter store could not be written", "Check permissions on the store path");
        register(&mut r, parameters::RELOAD_FAILED, "Parameters", High, true, false,
            "Persisted store reload failed", "Run the reload command manually and inspect output");
        register(&mut r, parameters::SNAPSHOT_RESTORE_FAILED, "Parameters", Critical, false, true,
            "Parameter snapshot restore failed", "Restore parameters manually from the snapshot values");
        register(&mut r, parameters::UNKNOWN_GROUP, "Parameters", Low, true, false,
            "Unknown parameter group", "Use one of the listed group names");

        register(&mut r, validation::ARTIFACT_INVALID, "Validation", High, true, false,
            "Configuration artifact failed its native syntax check", "Fix or roll back the artifact");
        register(&mut r, validation::CHECKER_UNAVAILABLE, "Validation", Medium, true, false,
            "Syntax checker could not be run", "Install the checker or skip validation");

        register(&mut r, orchestration::CONTROL_FAILED, "Orchestration", Medium, true, false,
            "A control failed to apply", "Review the control output in the run ledger");
        register(&mut r, orchestration::ERROR_BUDGET_EXCEEDED, "Orchestration", High, true, true,
            "Error budget exceeded", "Investigate failing controls before re-running");
        register(&mut r, orchestration::ROLLBACK_FAILED, "Orchestration", Critical, false, true,
            "Rollback failed, system may be inconsistent", "Use emergency recovery mode immediately");
        register(&mut r, orchestration::SNAPSHOT_REQUIRED, "Orchestration", High, true, true,
            "Recovery point is required before mutation", "Fix recovery storage or force no-backup");
        register(&mut r, orchestration::RUN_FAILED, "Orchestration", High, true, false,
            "Remediation run failed", "Review the run ledger");

        register(&mut r, coordination::HOST_FAILED, "Coordination", High, true, false,
            "Remediation failed on a host", "Review the host result and output");
        register(&mut r, coordination::HOST_CANCELLED, "Coordination", Low, true, false,
            "Host was not processed due to cancellation", "Re-run for the remaining hosts");
        register(&mut r, coordination::WORKER_PANICKED, "Coordination", Critical, false, false,
            "A coordinator worker panicked", "Report the failure with the full run log");

        for (code, description, action) in [
            (success::OPERATION_COMPLETED, "Operation completed successfully", "Continue"),
            (success::LOGGING_INITIALIZED, "Logging initialized", "Continue"),
            (success::PREFLIGHT_PASSED, "Pre-flight checks passed", "Continue to recovery point"),
            (success::RECOVERY_POINT_CREATED, "Recovery point created", "Continue to remediation"),
            (success::RECOVERY_POINT_RESTORED, "Recovery point restored", "Review the restored state"),
            (success::PARAMETERS_APPLIED, "Parameters applied", "Reboot if required"),
            (success::PARAMETER_SNAPSHOT_RESTORED, "Parameter snapshot restored", "Review parameter state"),
            (success::VALIDATION_PASSED, "Post-change validation passed", "Continue"),
            (success::CONTROL_APPLIED, "Control applied", "Continue"),
            (success::RUN_COMPLETED, "Remediation run completed", "Review the run report"),
            (success::HOST_COMPLETED, "Host remediation completed", "Continue"),
        ] {
            register(&mut r, code, "Success", Low, true, false, description, action);
        }

        r
    })
}

// ============================================================================
// CLASSIFICATION FUNCTIONS
// ============================================================================

/// Get metadata for a specific code
pub fn get_metadata(code: &str) -> Option<&'static CodeMetadata> {
    get_registry().get(code)
}

/// Get severity from code
pub fn get_severity(code: &str) -> Severity {
    get_registry()
        .get(code)
        .map(|metadata| metadata.severity)
        .unwrap_or(Severity::Medium)
}

/// Check if the condition behind a code is recoverable
pub fn is_recoverable(code: &str) -> bool {
    get_registry()
        .get(code)
        .map(|metadata| metadata.recoverable)
        .unwrap_or(true)
}

/// Check if the code requires halting the current host run
pub fn requires_halt(code: &str) -> bool {
    get_registry()
        .get(code)
        .map(|metadata| metadata.requires_halt)
        .unwrap_or(false)
}

/// Get human-readable description for code
pub fn get_description(code: &str) -> &'static str {
    get_registry()
        .get(code)
        .map(|metadata| metadata.description)
        .unwrap_or("Unknown error")
}

/// Get recommended action for code
pub fn get_action(code: &str) -> &'static str {
    get_registry()
        .get(code)
        .map(|metadata| metadata.recommended_action)
        .unwrap_or("No specific action available")
}

/// Get category from code
pub fn get_category(code: &str) -> &'static str {
    get_registry()
        .get(code)
        .map(|metadata| metadata.category)
        .unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_codes_halt() {
        assert_eq!(get_severity("RC003"), Severity::Critical);
        assert!(requires_halt(recovery::RESTORE_FAILED.as_str()));
        assert!(requires_halt(orchestration::ROLLBACK_FAILED.as_str()));
        assert!(!is_recoverable(orchestration::ROLLBACK_FAILED.as_str()));
    }

    #[test]
    fn test_unknown_code_defaults() {
        assert_eq!(get_category("ZZZ999"), "Unknown");
        assert_eq!(get_severity("ZZZ999"), Severity::Medium);
        assert!(is_recoverable("ZZZ999"));
        assert!(!requires_halt("ZZZ999"));
    }

    #[test]
    fn test_success_codes_registered() {
        let meta = get_metadata(success::RUN_COMPLETED.as_str()).unwrap();
        assert_eq!(meta.category, "Success");
        assert_eq!(meta.severity, Severity::Low);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("High"), Some(Severity::High));
        assert_eq!(Severity::parse("nope"), None);
    }
}
