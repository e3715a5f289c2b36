//! Per-host event collection for multi-host runs
//!
//! Worker threads tag their events with the host they are processing; the
//! collector groups those events so each host's result can carry its own
//! error trail.

use super::events::LogEvent;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

// ============================================================================
// HOST CONTEXT
// ============================================================================

/// Context for the host the current thread is working on
#[derive(Debug, Clone)]
pub struct HostContext {
    pub host: String,
    pub start_time: Instant,
}

impl HostContext {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

// ============================================================================
// ACTIVITY SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct HostActivitySummary {
    pub total_hosts: usize,
    pub hosts_with_errors: usize,
    pub hosts_with_warnings: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl HostActivitySummary {
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }
}

// ============================================================================
// EVENT COLLECTOR
// ============================================================================

/// Thread-safe event collector keyed by host
pub struct EventCollector {
    host_events: Mutex<BTreeMap<String, Vec<LogEvent>>>,
}

impl EventCollector {
    pub fn new() -> Self {
        Self {
            host_events: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Vec<LogEvent>>> {
        self.host_events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event for a host, capped per host
    pub fn record_event(&self, host: &str, event: LogEvent) {
        let max_events = super::config::get_max_events_per_host();
        let mut events = self.lock();
        let host_events = events.entry(host.to_string()).or_default();

        if host_events.len() < max_events {
            host_events.push(event);
        } else if host_events.len() == max_events {
            host_events.push(LogEvent::warning(&format!(
                "Too many events for host (limit: {})",
                max_events
            )));
        }
    }

    pub fn get_host_events(&self, host: &str) -> Vec<LogEvent> {
        self.lock().get(host).cloned().unwrap_or_default()
    }

    pub fn get_host_errors(&self, host: &str) -> Vec<LogEvent> {
        self.lock()
            .get(host)
            .map(|events| events.iter().filter(|e| e.is_error()).cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return a host's events
    pub fn take_host_events(&self, host: &str) -> Vec<LogEvent> {
        self.lock().remove(host).unwrap_or_default()
    }

    pub fn get_summary(&self) -> HostActivitySummary {
        let events = self.lock();
        let mut summary = HostActivitySummary {
            total_hosts: events.len(),
            ..Default::default()
        };

        for host_events in events.values() {
            let errors = host_events.iter().filter(|e| e.is_error()).count();
            let warnings = host_events.iter().filter(|e| e.is_warning()).count();
            summary.total_errors += errors;
            summary.total_warnings += warnings;
            if errors > 0 {
                summary.hosts_with_errors += 1;
            } else if warnings > 0 {
                summary.hosts_with_warnings += 1;
            }
        }

        summary
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for EventCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::codes;

    #[test]
    fn test_events_grouped_by_host() {
        let collector = EventCollector::new();
        collector.record_event("h1", LogEvent::error(codes::transport::TIMEOUT, "timeout"));
        collector.record_event("h1", LogEvent::warning("slow"));
        collector.record_event("h2", LogEvent::info("fine"));

        assert_eq!(collector.get_host_errors("h1").len(), 1);
        assert_eq!(collector.get_host_events("h2").len(), 1);

        let summary = collector.get_summary();
        assert_eq!(summary.total_hosts, 2);
        assert_eq!(summary.hosts_with_errors, 1);
        assert_eq!(summary.total_warnings, 1);
    }

    #[test]
    fn test_take_removes_host() {
        let collector = EventCollector::new();
        collector.record_event("h1", LogEvent::info("one"));
        assert_eq!(collector.take_host_events("h1").len(), 1);
        assert!(collector.get_host_events("h1").is_empty());
    }
}
