//! Persisted parameter store rendering and parsing

use super::spec::ParameterSpec;
use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

/// Values recorded in the store's header comment block
#[derive(Debug, Clone)]
pub struct StoreHeader {
    pub generator: String,
    pub generated_at: DateTime<Local>,
    pub snapshot_id: Option<String>,
}

impl StoreHeader {
    pub fn new(snapshot_id: Option<&str>) -> Self {
        Self {
            generator: format!("stig-remediate {}", env!("CARGO_PKG_VERSION")),
            generated_at: Local::now(),
            snapshot_id: snapshot_id.map(str::to_string),
        }
    }
}

/// Render `key = value` lines under a header comment block
pub fn render_store(specs: &[ParameterSpec], header: &StoreHeader) -> String {
    let mut out = String::new();
    out.push_str("# STIG Kernel Parameters\n");
    out.push_str(&format!("# Generated by {}\n", header.generator));
    out.push_str(&format!("# Date: {}\n", header.generated_at.to_rfc3339()));
    if let Some(id) = &header.snapshot_id {
        out.push_str(&format!("# Snapshot ID: {}\n", id));
    }
    out.push_str("#\n");
    out.push_str("# WARNING: This file was auto-generated. Manual changes may be overwritten.\n");
    out.push_str("#\n\n");

    for spec in specs {
        out.push_str(&format!("{} = {}\n", spec.name, spec.desired));
    }
    out
}

fn assignment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*-?([A-Za-z0-9_./-]+)[ \t]*=[ \t]*(.*?)[ \t]*$")
            .expect("assignment pattern is a valid regex")
    })
}

/// `key = value` assignments in file order; comments and blank lines are skipped
pub fn parse_assignments(text: &str) -> Vec<(String, String)> {
    assignment_pattern()
        .captures_iter(text)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}
