//! Append-only record of one orchestrator run

use crate::controls::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully applied control
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRecord {
    pub id: String,
    pub description: String,
    pub category: Category,
    pub timestamp: DateTime<Utc>,
}

/// Free-text entry attributed to the component that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub component: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(component: &str, message: impl Into<String>) -> Self {
        Self {
            component: component.to_string(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

pub type ChangeRecord = LedgerEntry;
pub type ErrorRecord = LedgerEntry;
pub type WarningRecord = LedgerEntry;

/// Entries are only ever appended; nothing is edited or removed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunLedger {
    controls: Vec<ControlRecord>,
    changes: Vec<ChangeRecord>,
    errors: Vec<ErrorRecord>,
    warnings: Vec<WarningRecord>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_control(&mut self, id: &str, description: &str, category: Category) {
        self.controls.push(ControlRecord {
            id: id.to_string(),
            description: description.to_string(),
            category,
            timestamp: Utc::now(),
        });
    }

    pub fn change(&mut self, component: &str, message: impl Into<String>) {
        self.changes.push(LedgerEntry::new(component, message));
    }

    pub fn error(&mut self, component: &str, message: impl Into<String>) {
        self.errors.push(LedgerEntry::new(component, message));
    }

    pub fn warning(&mut self, component: &str, message: impl Into<String>) {
        self.warnings.push(LedgerEntry::new(component, message));
    }

    pub fn controls(&self) -> &[ControlRecord] {
        &self.controls
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn warnings(&self) -> &[WarningRecord] {
        &self.warnings
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn applied_in(&self, category: Category) -> usize {
        self.controls.iter().filter(|c| c.category == category).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_only_counts() {
        let mut ledger = RunLedger::new();
        ledger.record_control("V-1", "one", Category::CatI);
        ledger.record_control("V-2", "two", Category::CatII);
        ledger.change("V-1", "ran: systemctl enable auditd");
        ledger.error("V-3", "exit 1");
        ledger.warning("preflight", "interactive session");

        assert_eq!(ledger.applied_in(Category::CatI), 1);
        assert_eq!(ledger.applied_in(Category::CatIII), 0);
        assert_eq!(ledger.error_count(), 1);
        assert_eq!(ledger.errors()[0].component, "V-3");
        assert_eq!(ledger.warnings().len(), 1);
        assert_eq!(ledger.changes().len(), 1);
    }
}
