//! Logging configuration access
//!
//! Preferences are installed once at startup; until then the environment
//! defaults apply.

use super::events::LogLevel;
use crate::limits::logging::{EVENT_BUFFER_SIZE, MAX_EVENTS_PER_HOST};
use crate::preferences::LoggingPreferences;
use std::sync::OnceLock;

static RUNTIME_PREFERENCES: OnceLock<LoggingPreferences> = OnceLock::new();

/// Install runtime preferences
pub fn init_runtime_preferences(preferences: LoggingPreferences) -> Result<(), String> {
    validate_preferences(&preferences)?;

    RUNTIME_PREFERENCES
        .set(preferences)
        .map_err(|_| "Runtime preferences already initialized".to_string())
}

fn get_runtime_preferences() -> LoggingPreferences {
    RUNTIME_PREFERENCES.get().cloned().unwrap_or_default()
}

fn validate_preferences(preferences: &LoggingPreferences) -> Result<(), String> {
    if LogLevel::parse(&preferences.min_log_level).is_none() {
        return Err(format!(
            "Unknown log level '{}' (expected error, warn, info or debug)",
            preferences.min_log_level
        ));
    }
    Ok(())
}

pub fn validate_config() -> Result<(), String> {
    validate_preferences(&get_runtime_preferences())
}

pub fn get_min_log_level() -> LogLevel {
    get_runtime_preferences().level()
}

pub fn use_structured_logging() -> bool {
    get_runtime_preferences().use_structured_logging
}

pub fn use_console_logging() -> bool {
    get_runtime_preferences().enable_console_logging
}

pub fn log_file() -> Option<String> {
    get_runtime_preferences().log_file
}

pub fn get_event_buffer_size() -> usize {
    EVENT_BUFFER_SIZE
}

pub fn get_max_events_per_host() -> usize {
    MAX_EVENTS_PER_HOST
}

pub fn get_config_summary() -> String {
    let prefs = get_runtime_preferences();
    format!(
        "Log level: {}\nStructured: {}\nConsole: {}\nLog file: {}\n",
        prefs.level().as_str(),
        prefs.use_structured_logging,
        prefs.enable_console_logging,
        prefs.log_file.as_deref().unwrap_or("none")
    )
}
