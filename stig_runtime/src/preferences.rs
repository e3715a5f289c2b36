//! Runtime preferences read from the environment

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingPreferences {
    /// Minimum level emitted (`STIG_LOG_LEVEL`: error, warn, info, debug)
    pub min_log_level: String,

    /// Emit one JSON object per line (`STIG_LOG_FORMAT=json`)
    pub use_structured_logging: bool,

    /// Write events to the terminal (`STIG_LOG_CONSOLE`)
    pub enable_console_logging: bool,

    /// Optional persistent log file (`STIG_LOG_FILE`)
    pub log_file: Option<String>,
}

impl LoggingPreferences {
    pub fn level(&self) -> LogLevel {
        LogLevel::parse(&self.min_log_level).unwrap_or(LogLevel::Info)
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.min_log_level = level.as_str().to_string();
        self
    }

    pub fn with_structured(mut self, structured: bool) -> Self {
        self.use_structured_logging = structured;
        self
    }
}

impl Default for LoggingPreferences {
    fn default() -> Self {
        Self {
            min_log_level: env::var("STIG_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            use_structured_logging: env::var("STIG_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            enable_console_logging: env::var("STIG_LOG_CONSOLE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
            log_file: env::var("STIG_LOG_FILE").ok().filter(|v| !v.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_falls_back_to_info() {
        let prefs = LoggingPreferences {
            min_log_level: "verbose".to_string(),
            use_structured_logging: false,
            enable_console_logging: true,
            log_file: None,
        };
        assert_eq!(prefs.level(), LogLevel::Info);
        assert_eq!(prefs.with_level(LogLevel::Debug).level(), LogLevel::Debug);
    }
}
