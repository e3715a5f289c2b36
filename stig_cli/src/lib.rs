//! # STIG Remediation CLI
//!
//! Command-line front end for the remediation engine: local runs, SSH
//! fan-out to many hosts, recovery point management and kernel parameter
//! inspection.

pub mod args;
pub mod commands;
pub mod error;
pub mod handlers;
pub mod ssh;

pub use args::Cli;
pub use error::CliError;

use args::Command;
use std::process::ExitCode;
use stig_engine::config::EngineConfig;
use stig_runtime::log_info;

/// Defaults, then the configuration file, then `STIG_*` environment overrides
pub fn load_config(cli: &Cli) -> Result<EngineConfig, CliError> {
    let config = match &cli.config {
        Some(path) => {
            log_info!("Loading configuration", "path" => path.display());
            EngineConfig::from_toml_file(path)?
        }
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

/// Dispatch a parsed command line
pub fn execute(cli: Cli) -> Result<ExitCode, CliError> {
    let config = load_config(&cli)?;

    match &cli.command {
        Command::Run(args) => {
            let config = args.apply(config)?;
            config.validate()?;
            let catalog = handlers::load_catalog(cli.catalog.as_deref())?;
            handlers::run(&config, &catalog, args.report.as_deref())
        }
        Command::Remote(args) => {
            let config = args.apply(config)?;
            handlers::remote(&config, args)
        }
        Command::Preflight(force) => {
            let force = force.merge_into(config.force);
            handlers::preflight(&config.with_force(force))
        }
        Command::Validate => handlers::validate(&config),
        Command::Recovery(command) => handlers::recovery(&config, command),
        Command::Params(command) => handlers::params(&config, command),
    }
}
