//! Global logging for the remediation engine
//!
//! Thread-safe global logging with per-host event collection and a small
//! macro interface (`log_error!`, `log_success!`, `log_info!`, `log_warning!`,
//! `log_debug!`).

#[macro_use]
pub mod macros;
pub mod codes;
pub mod collector;
pub mod config;
pub mod events;
pub mod service;

use std::cell::RefCell;
use std::sync::{Arc, OnceLock};

pub use codes::Code;
pub use collector::{EventCollector, HostActivitySummary, HostContext};
pub use events::{LogEvent, LogLevel};
#[cfg(feature = "log-bridge")]
pub use service::LogCrateLogger;
pub use service::{ConsoleLogger, FileLogger, Logger, LoggingService, MemoryLogger, StructuredLogger};

// ============================================================================
// GLOBAL STATE
// ============================================================================

static GLOBAL_LOGGER: OnceLock<Arc<LoggingService>> = OnceLock::new();
static GLOBAL_EVENT_COLLECTOR: OnceLock<Arc<EventCollector>> = OnceLock::new();

thread_local! {
    static HOST_CONTEXT: RefCell<Option<HostContext>> = const { RefCell::new(None) };
}

// ============================================================================
// INITIALIZATION
// ============================================================================

/// Initialize global logging from the environment preferences
pub fn init_global_logging() -> Result<(), String> {
    config::validate_config().map_err(|e| format!("Configuration validation failed: {}", e))?;

    let mut service = service::create_configured_service();
    if let Some(path) = config::log_file() {
        let file_logger = FileLogger::new(
            &path,
            config::get_min_log_level(),
            config::use_structured_logging(),
        )
        .map_err(|e| format!("Cannot open log file {}: {}", path, e))?;
        service = service.with_logger(Arc::new(file_logger));
    }

    init_global_logging_with_service(Arc::new(service))?;

    if let Some(logger) = try_get_global_logger() {
        logger.log_event(LogEvent::success(
            codes::success::LOGGING_INITIALIZED,
            "Global logging system initialized",
        ));
    }

    Ok(())
}

/// Initialize with custom service
pub fn init_global_logging_with_service(service: Arc<LoggingService>) -> Result<(), String> {
    GLOBAL_LOGGER
        .set(service)
        .map_err(|_| "Global logger already initialized")?;

    let _ = GLOBAL_EVENT_COLLECTOR.set(Arc::new(EventCollector::new()));

    Ok(())
}

pub fn is_initialized() -> bool {
    GLOBAL_LOGGER.get().is_some()
}

// ============================================================================
// GLOBAL ACCESS
// ============================================================================

/// Safe access to global logger
pub fn try_get_global_logger() -> Option<&'static LoggingService> {
    GLOBAL_LOGGER.get().map(|service| service.as_ref())
}

/// Access to the host event collector; created lazily so host scoping works
/// even before a logger is installed
pub fn global_event_collector() -> &'static EventCollector {
    GLOBAL_EVENT_COLLECTOR
        .get_or_init(|| Arc::new(EventCollector::new()))
        .as_ref()
}

// ============================================================================
// HOST CONTEXT MANAGEMENT
// ============================================================================

pub fn set_host_context(host: &str) {
    HOST_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = Some(HostContext::new(host));
    });
}

pub fn clear_host_context() {
    HOST_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = None;
    });
}

/// Execute function with every event tagged by `host`
pub fn with_host_context<F, R>(host: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let previous = get_current_host_context();
    set_host_context(host);
    let result = f();
    HOST_CONTEXT.with(|ctx| {
        *ctx.borrow_mut() = previous;
    });
    result
}

pub fn get_current_host_context() -> Option<HostContext> {
    HOST_CONTEXT.with(|ctx| ctx.borrow().clone())
}

// ============================================================================
// MACRO SUPPORT FUNCTIONS
// ============================================================================

fn dispatch(mut event: LogEvent, context: Vec<(&str, &str)>) {
    for (key, value) in context {
        event = event.with_context(key, value);
    }

    if let Some(host_ctx) = get_current_host_context() {
        event = event.with_host(&host_ctx.host);
        if event.is_error() || event.is_warning() {
            global_event_collector().record_event(&host_ctx.host, event.clone());
        }
    }

    if let Some(logger) = try_get_global_logger() {
        logger.log_event(event);
    }
}

/// Used by `log_error!`
pub fn log_error_with_context(code: Code, message: &str, context: Vec<(&str, &str)>) {
    dispatch(LogEvent::error(code, message), context);
}

/// Used by `log_success!`
pub fn log_success_with_context(code: Code, message: &str, context: Vec<(&str, &str)>) {
    dispatch(LogEvent::success(code, message), context);
}

/// Used by `log_info!`
pub fn log_info_with_context(message: &str, context: Vec<(&str, &str)>) {
    dispatch(LogEvent::info(message), context);
}

/// Used by `log_warning!`
pub fn log_warning_with_context(message: &str, context: Vec<(&str, &str)>) {
    dispatch(LogEvent::warning(message), context);
}

/// Used by `log_debug!`
pub fn log_debug_with_context(message: &str, context: Vec<(&str, &str)>) {
    dispatch(LogEvent::debug(message), context);
}

// ============================================================================
// HOST SUMMARIES
// ============================================================================

/// Errors recorded for a host while it was the active host context
pub fn get_host_errors(host: &str) -> Vec<LogEvent> {
    global_event_collector().get_host_errors(host)
}

pub fn take_host_events(host: &str) -> Vec<LogEvent> {
    global_event_collector().take_host_events(host)
}

pub fn get_activity_summary() -> HostActivitySummary {
    global_event_collector().get_summary()
}

pub fn get_system_diagnostics() -> String {
    let mut diagnostics = String::new();

    diagnostics.push_str("=== Logging System Diagnostics ===\n");
    diagnostics.push_str(&format!("Initialized: {}\n", is_initialized()));

    let summary = get_activity_summary();
    diagnostics.push_str(&format!("Hosts tracked: {}\n", summary.total_hosts));
    diagnostics.push_str(&format!("Total errors: {}\n", summary.total_errors));
    diagnostics.push_str(&format!("Total warnings: {}\n", summary.total_warnings));

    diagnostics.push('\n');
    diagnostics.push_str(&config::get_config_summary());

    diagnostics
}

// ============================================================================
// SAFE FALLBACK LOGGING
// ============================================================================

/// Critical events always reach stderr, even without a global logger
pub fn safe_log_critical(code: Code, message: &str) {
    if let Some(logger) = try_get_global_logger() {
        logger.log_event(LogEvent::error(code, message));
    }
    eprintln!("CRITICAL ERROR [{}]: {}", code.as_str(), message);
}
