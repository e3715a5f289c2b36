//! # STIG Remediation CLI
//!

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use stig_cli::handlers::EXIT_CRITICAL;
use stig_cli::{Cli, CliError};
use stig_runtime::logging::{self, FileLogger, LogCrateLogger, LoggingService};
use stig_runtime::{log_error, log_info, LogLevel, LoggingPreferences};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::from(EXIT_CRITICAL);
    }
    log_info!("STIG remediation starting", "version" => env!("CARGO_PKG_VERSION"));

    match stig_cli::execute(cli) {
        Ok(code) => code,
        Err(e) => {
            log_error!(e.code(), &e.to_string());
            eprintln!("Error: {}", e.user_message());
            if e.is_critical() {
                eprintln!("The host may be partially changed; restore a recovery point before retrying.");
                ExitCode::from(EXIT_CRITICAL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Engine events go through `env_logger` unless JSON output is requested,
/// in which case the engine's structured logger writes them directly.
fn init_logging(cli: &Cli) -> Result<(), CliError> {
    let mut preferences = LoggingPreferences::default();
    if let Some(level) = &cli.log_level {
        preferences.min_log_level = level.clone();
    }
    if cli.json_logs {
        preferences = preferences.with_structured(true);
    }

    logging::config::init_runtime_preferences(preferences.clone()).map_err(CliError::Logging)?;

    if preferences.use_structured_logging {
        return logging::init_global_logging().map_err(CliError::Logging);
    }

    let level = preferences.level();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(format!("stig={}", level_filter(level))),
    )
    .format_timestamp_millis()
    .init();

    let mut service = LoggingService::new(Arc::new(LogCrateLogger), level);
    if let Some(path) = &preferences.log_file {
        let file_logger = FileLogger::new(path, level, false)
            .map_err(|e| CliError::Logging(format!("cannot open log file {}: {}", path, e)))?;
        service = service.with_logger(Arc::new(file_logger));
    }

    logging::init_global_logging_with_service(Arc::new(service)).map_err(CliError::Logging)
}

fn level_filter(level: LogLevel) -> log::LevelFilter {
    match level {
        LogLevel::Error => log::LevelFilter::Error,
        LogLevel::Warning => log::LevelFilter::Warn,
        LogLevel::Info => log::LevelFilter::Info,
        LogLevel::Debug => log::LevelFilter::Debug,
    }
}
