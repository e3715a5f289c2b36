//! Analysis results and the compliance report

use super::spec::ImpactLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterValidationResult {
    pub name: String,
    pub desired: String,
    /// `None` when the live value could not be read
    pub current: Option<String>,
    pub compliant: bool,
    pub error: Option<String>,
}

impl ParameterValidationResult {
    pub fn is_unreadable(&self) -> bool {
        self.current.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub results: Vec<ParameterValidationResult>,
}

impl ValidationSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn compliant(&self) -> Vec<&ParameterValidationResult> {
        self.results.iter().filter(|r| r.compliant).collect()
    }

    /// Readable but wrong
    pub fn non_compliant(&self) -> Vec<&ParameterValidationResult> {
        self.results
            .iter()
            .filter(|r| !r.compliant && !r.is_unreadable())
            .collect()
    }

    pub fn unreadable(&self) -> Vec<&ParameterValidationResult> {
        self.results.iter().filter(|r| r.is_unreadable()).collect()
    }

    pub fn drift_detected(&self) -> bool {
        self.results.iter().any(|r| !r.compliant)
    }

    /// 100 × compliant / total; an empty set scores 100
    pub fn score(&self) -> f64 {
        if self.results.is_empty() {
            return 100.0;
        }
        self.compliant().len() as f64 / self.results.len() as f64 * 100.0
    }
}

// ============================================================================
// PERSISTENCE, REBOOT, CONFLICTS, IMPACT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedValue {
    pub file: PathBuf,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceReport {
    pub config_files: Vec<PathBuf>,
    pub found: BTreeMap<String, Vec<PersistedValue>>,
    /// Names with no persisted occurrence of the desired value
    pub missing: Vec<String>,
    /// Names also persisted with a different value somewhere
    pub contradicted: Vec<String>,
}

impl PersistenceReport {
    pub fn verified(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootAnalysis {
    pub require_reboot: Vec<String>,
    pub runtime: Vec<String>,
}

impl RebootAnalysis {
    pub fn reboot_recommended(&self) -> bool {
        !self.require_reboot.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSource {
    /// Catalog metadata
    Documented,
    /// Observed on the host
    Observed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFinding {
    pub name: String,
    pub desired: String,
    pub description: String,
    pub warning: String,
    pub source: ConflictSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactEntry {
    pub name: String,
    pub desired: String,
    pub level: ImpactLevel,
    pub rationale: String,
    pub mitigation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub high: Vec<ImpactEntry>,
    pub medium: Vec<ImpactEntry>,
    pub low: Vec<ImpactEntry>,
    pub undocumented: Vec<String>,
    pub overall: ImpactLevel,
}

impl ImpactAssessment {
    /// Any high → HIGH; more than two medium → MEDIUM; otherwise LOW
    pub fn overall_for(high: usize, medium: usize) -> ImpactLevel {
        if high > 0 {
            ImpactLevel::High
        } else if medium > 2 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }
}

// ============================================================================
// GRADE AND RECOMMENDATIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    #[serde(rename = "B+")]
    BPlus,
    B,
    #[serde(rename = "C+")]
    CPlus,
    C,
    D,
    F,
}

impl Grade {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 95.0 => Grade::APlus,
            s if s >= 90.0 => Grade::A,
            s if s >= 85.0 => Grade::BPlus,
            s if s >= 80.0 => Grade::B,
            s if s >= 75.0 => Grade::CPlus,
            s if s >= 70.0 => Grade::C,
            s if s >= 60.0 => Grade::D,
            _ => Grade::F,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::APlus => "A+",
            Grade::A => "A",
            Grade::BPlus => "B+",
            Grade::B => "B",
            Grade::CPlus => "C+",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub priority: Priority,
    pub category: String,
    pub issue: String,
    pub action: String,
    pub risk: String,
}

impl Recommendation {
    fn new(priority: Priority, category: &str, issue: String, action: &str, risk: &str) -> Self {
        Self {
            priority,
            category: category.to_string(),
            issue,
            action: action.to_string(),
            risk: risk.to_string(),
        }
    }
}

// ============================================================================
// COMPLIANCE REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub validation: ValidationSummary,
    pub persistence: PersistenceReport,
    pub reboot: RebootAnalysis,
    pub conflicts: Vec<ConflictFinding>,
    pub performance: ImpactAssessment,
    pub score: f64,
    pub grade: Grade,
    pub recommendations: Vec<Recommendation>,
}

impl ComplianceReport {
    pub fn assemble(
        validation: ValidationSummary,
        persistence: PersistenceReport,
        reboot: RebootAnalysis,
        conflicts: Vec<ConflictFinding>,
        performance: ImpactAssessment,
    ) -> Self {
        let score = validation.score();
        let grade = Grade::from_score(score);
        let mut report = Self {
            report_id: format!("param_compliance_{}", chrono::Local::now().format("%Y%m%d_%H%M%S")),
            generated_at: Utc::now(),
            validation,
            persistence,
            reboot,
            conflicts,
            performance,
            score,
            grade,
            recommendations: Vec::new(),
        };
        report.recommendations = recommendations_for(&report);
        report
    }
}

/// One fixed recommendation per non-empty finding, in a fixed order
pub fn recommendations_for(report: &ComplianceReport) -> Vec<Recommendation> {
    let mut out = Vec::new();

    let non_compliant = report.validation.non_compliant().len();
    if non_compliant > 0 {
        out.push(Recommendation::new(
            Priority::High,
            "Compliance",
            format!("{} parameters are not compliant", non_compliant),
            "Apply the parameter set to remediate non-compliant values",
            "System does not meet its hardening requirements",
        ));
    }

    if !report.persistence.verified() {
        out.push(Recommendation::new(
            Priority::High,
            "Persistence",
            format!("{} parameters not in config files", report.persistence.missing.len()),
            "Apply the parameter set to persist values across reboots",
            "Parameters will revert to defaults after a reboot",
        ));
    }

    if report.reboot.reboot_recommended() {
        out.push(Recommendation::new(
            Priority::Medium,
            "Reboot Required",
            format!("{} parameters require reboot", report.reboot.require_reboot.len()),
            "Schedule a reboot to apply all kernel parameters",
            "Some hardening parameters are not fully effective until reboot",
        ));
    }

    if !report.performance.high.is_empty() {
        out.push(Recommendation::new(
            Priority::Medium,
            "Performance Impact",
            format!("{} high-impact parameters detected", report.performance.high.len()),
            "Review high-impact parameters and validate system functionality",
            "Parameters may affect routing, networking or other critical functions",
        ));
    }

    if !report.conflicts.is_empty() {
        out.push(Recommendation::new(
            Priority::High,
            "Conflicts",
            format!("{} parameter conflicts or warnings detected", report.conflicts.len()),
            "Review conflict warnings against the system's role",
            "Hardening may break required system functionality",
        ));
    }

    let unreadable = report.validation.unreadable().len();
    if unreadable > 0 {
        out.push(Recommendation::new(
            Priority::Medium,
            "Missing Parameters",
            format!("{} parameters cannot be read", unreadable),
            "Verify the kernel supports every required parameter",
            "Some requirements cannot be validated or enforced",
        ));
    }

    if report.score < 100.0 {
        out.push(Recommendation::new(
            Priority::High,
            "Overall Compliance",
            format!("System compliance at {:.1}% (Grade: {})", report.score, report.grade),
            "Apply the parameter set to reach full compliance",
            "System is not fully hardened",
        ));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, current: Option<&str>, compliant: bool) -> ParameterValidationResult {
        ParameterValidationResult {
            name: name.to_string(),
            desired: "1".to_string(),
            current: current.map(str::to_string),
            compliant,
            error: None,
        }
    }

    #[test]
    fn test_grade_bands() {
        assert_eq!(Grade::from_score(100.0), Grade::APlus);
        assert_eq!(Grade::from_score(95.0), Grade::APlus);
        assert_eq!(Grade::from_score(94.9), Grade::A);
        assert_eq!(Grade::from_score(90.0), Grade::A);
        assert_eq!(Grade::from_score(89.9), Grade::BPlus);
        assert_eq!(Grade::from_score(85.0), Grade::BPlus);
        assert_eq!(Grade::from_score(80.0), Grade::B);
        assert_eq!(Grade::from_score(75.0), Grade::CPlus);
        assert_eq!(Grade::from_score(70.0), Grade::C);
        assert_eq!(Grade::from_score(60.0), Grade::D);
        assert_eq!(Grade::from_score(59.9), Grade::F);
        assert_eq!(Grade::APlus.to_string(), "A+");
    }

    #[test]
    fn test_score_is_exact_ratio() {
        let summary = ValidationSummary {
            results: vec![
                result("a", Some("1"), true),
                result("b", Some("0"), false),
                result("c", None, false),
                result("d", Some("1"), true),
            ],
        };
        assert_eq!(summary.score(), 50.0);
        assert_eq!(summary.non_compliant().len(), 1);
        assert_eq!(summary.unreadable().len(), 1);
        assert!(summary.drift_detected());
        assert_eq!(ValidationSummary::default().score(), 100.0);
    }

    #[test]
    fn test_overall_impact() {
        assert_eq!(ImpactAssessment::overall_for(1, 0), ImpactLevel::High);
        assert_eq!(ImpactAssessment::overall_for(0, 3), ImpactLevel::Medium);
        assert_eq!(ImpactAssessment::overall_for(0, 2), ImpactLevel::Low);
    }

    #[test]
    fn test_recommendations_follow_findings() {
        let clean = ComplianceReport::assemble(
            ValidationSummary {
                results: vec![result("a", Some("1"), true)],
            },
            PersistenceReport::default(),
            RebootAnalysis::default(),
            Vec::new(),
            ImpactAssessment {
                high: Vec::new(),
                medium: Vec::new(),
                low: Vec::new(),
                undocumented: vec!["a".into()],
                overall: ImpactLevel::Low,
            },
        );
        assert!(clean.recommendations.is_empty());
        assert_eq!(clean.grade, Grade::APlus);

        let drifted = ComplianceReport::assemble(
            ValidationSummary {
                results: vec![result("a", Some("0"), false), result("b", None, false)],
            },
            PersistenceReport {
                missing: vec!["a".into()],
                ..PersistenceReport::default()
            },
            RebootAnalysis {
                require_reboot: vec!["a".into()],
                runtime: vec!["b".into()],
            },
            Vec::new(),
            clean.performance.clone(),
        );
        let categories: Vec<_> = drifted.recommendations.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(
            categories,
            vec!["Compliance", "Persistence", "Reboot Required", "Missing Parameters", "Overall Compliance"]
        );
        assert_eq!(drifted.recommendations[2].priority, Priority::Medium);
    }
}
