//! Run summary handed back at the end of every orchestrator run

use super::ledger::RunLedger;
use crate::controls::Category;
use crate::preflight::PreflightReport;
use crate::validation::ValidationOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Success,
    /// The host was put back to the recovery point
    RolledBack,
    Failed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalState::Success => "SUCCESS",
            TerminalState::RolledBack => "ROLLED BACK",
            TerminalState::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Where the run executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostContext {
    pub hostname: String,
    pub os_info: String,
}

impl HostContext {
    pub fn from_system() -> Self {
        Self {
            hostname: hostname::get()
                .unwrap_or_else(|_| std::ffi::OsString::from("unknown"))
                .to_string_lossy()
                .to_string(),
            os_info: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub host: HostContext,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub emergency: bool,
    pub categories: Vec<Category>,
    pub force_flags: Vec<String>,
    pub state: TerminalState,
    /// Set when a rollback was needed and did not complete
    pub critical: bool,
    pub failure: Option<String>,
    pub recovery_point: Option<String>,
    pub parameter_snapshot: Option<String>,
    pub preflight: Option<PreflightReport>,
    pub validation: Option<ValidationOutcome>,
    pub skipped_high_risk: Vec<String>,
    pub ledger: RunLedger,
}

impl RunReport {
    pub fn new(dry_run: bool, emergency: bool, categories: Vec<Category>, force_flags: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            host: HostContext::from_system(),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
            dry_run,
            emergency,
            categories,
            force_flags,
            state: TerminalState::Failed,
            critical: false,
            failure: None,
            recovery_point: None,
            parameter_snapshot: None,
            preflight: None,
            validation: None,
            skipped_high_risk: Vec::new(),
            ledger: RunLedger::new(),
        }
    }

    pub(crate) fn finish(&mut self, state: TerminalState) {
        self.state = state;
        self.finished_at = Utc::now();
        self.duration_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
    }

    /// Success with nothing in the error ledger
    pub fn is_clean(&self) -> bool {
        self.state == TerminalState::Success && self.ledger.error_count() == 0
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} controls applied, {} errors, {} warnings{}",
            self.state,
            self.ledger.controls().len(),
            self.ledger.error_count(),
            self.ledger.warnings().len(),
            if self.critical { " [CRITICAL: manual recovery required]" } else { "" }
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let json = self
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = RunReport::new(false, false, Category::all().to_vec(), vec!["force".into()]);
        report.ledger.error("V-1", "exit 1");
        report.finish(TerminalState::Success);
        assert!(!report.is_clean());
        assert!(report.summary_line().starts_with("SUCCESS: 0 controls applied, 1 errors"));

        let path = dir.path().join("reports/run.json");
        report.save_json(&path).unwrap();
        let loaded = RunReport::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.run_id, report.run_id);
        assert_eq!(loaded.state, TerminalState::Success);
        assert_eq!(loaded.ledger.error_count(), 1);
    }
}
