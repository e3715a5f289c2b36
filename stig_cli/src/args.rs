//! Command-line surface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use stig_engine::config::EngineConfig;
use stig_engine::controls::Category;
use stig_engine::ForceFlags;

use crate::error::CliError;

/// STIG remediation for Ubuntu hosts
#[derive(Parser, Debug)]
#[command(name = "stig-remediate")]
#[command(version)]
#[command(about = "Apply STIG hardening with pre-flight checks, recovery points and rollback", long_about = None)]
pub struct Cli {
    /// Engine configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Control catalog (TOML); the built-in kernel parameter catalog when omitted
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Log level (error, warn, info, debug)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit one JSON object per log event
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remediate this host
    Run(RunArgs),

    /// Remediate remote hosts over SSH
    Remote(RemoteArgs),

    /// Run the pre-flight checks and report whether remediation may start
    Preflight(ForceArgs),

    /// Syntax-check sshd, sudoers, PAM and GRUB configuration
    Validate,

    /// Manage recovery points
    #[command(subcommand)]
    Recovery(RecoveryCommand),

    /// Inspect and apply kernel parameters
    #[command(subcommand)]
    Params(ParamsCommand),
}

/// Safety overrides. `--force` alone bypasses pre-flight failures.
#[derive(Args, Debug, Clone, Default)]
pub struct ForceArgs {
    #[arg(long)]
    pub force: bool,

    /// Record control failures as warnings
    #[arg(long)]
    pub ignore_errors: bool,

    #[arg(long)]
    pub skip_validation: bool,

    /// Take a recovery point but never roll back automatically
    #[arg(long)]
    pub no_rollback: bool,

    #[arg(long)]
    pub skip_preflight: bool,

    /// Do not take a recovery point (high risk)
    #[arg(long)]
    pub no_backup: bool,

    /// Accept an operating system other than the expected one
    #[arg(long)]
    pub override_os: bool,

    /// Also apply controls flagged as high risk
    #[arg(long)]
    pub apply_all: bool,
}

impl ForceArgs {
    /// Merge onto the configured flags; a flag given on the command line always wins
    pub fn merge_into(&self, mut force: ForceFlags) -> ForceFlags {
        force.enabled |= self.force;
        force.ignore_errors |= self.ignore_errors;
        force.skip_validation |= self.skip_validation;
        force.no_rollback |= self.no_rollback;
        force.skip_preflight |= self.skip_preflight;
        force.no_backup |= self.no_backup;
        force.override_os |= self.override_os;
        force.apply_all |= self.apply_all;
        force
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Report what would change without touching the host
    #[arg(long)]
    pub dry_run: bool,

    /// Categories to apply, e.g. `cat1,cat2`
    #[arg(long, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Errors tolerated before the run aborts
    #[arg(long)]
    pub error_threshold: Option<usize>,

    /// Restore a recovery point instead of remediating
    #[arg(long)]
    pub emergency: bool,

    /// Recovery point for `--emergency`; the most recent one when omitted
    #[arg(long, requires = "emergency")]
    pub recovery_point: Option<String>,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub force: ForceArgs,
}

impl RunArgs {
    pub fn apply(&self, mut config: EngineConfig) -> Result<EngineConfig, CliError> {
        if self.dry_run {
            config = config.with_dry_run();
        }
        if !self.categories.is_empty() {
            config = config.with_categories(&parse_categories(&self.categories)?);
        }
        if let Some(threshold) = self.error_threshold {
            config = config.with_error_threshold(threshold);
        }
        if self.emergency {
            config = config.with_emergency(self.recovery_point.clone());
        }
        let force = self.force.merge_into(config.force);
        Ok(config.with_force(force))
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RemoteArgs {
    /// Target host as `[user@]host[:port]`; repeat for several. Defaults to the configured hosts.
    #[arg(long = "host")]
    pub hosts: Vec<String>,

    /// One host at a time
    #[arg(long)]
    pub serial: bool,

    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Timeout for the whole remote run, in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// SSH private key
    #[arg(long)]
    pub identity_file: Option<PathBuf>,

    /// Binary delivered to each host; this executable when omitted
    #[arg(long)]
    pub payload: Option<PathBuf>,

    /// Write the multi-host report as JSON
    #[arg(long = "hosts-report")]
    pub hosts_report: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

impl RemoteArgs {
    pub fn apply(&self, config: EngineConfig) -> Result<EngineConfig, CliError> {
        let mut config = self.run.apply(config)?;
        let mut coordinator = config.coordinator.clone();
        if self.serial {
            coordinator = coordinator.with_parallel(false);
        }
        if let Some(workers) = self.max_workers {
            coordinator = coordinator.with_max_workers(workers);
        }
        if let Some(secs) = self.timeout {
            coordinator = coordinator.with_remediation_timeout(std::time::Duration::from_secs(secs));
        }
        if !self.hosts.is_empty() {
            config = config.with_hosts(self.hosts.clone());
        }
        let config = config.with_coordinator(coordinator);
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
pub enum RecoveryCommand {
    /// List recovery points, newest first
    List,

    /// Take a recovery point now
    Create {
        #[arg(default_value = "manual")]
        name: String,
    },

    /// Restore a recovery point
    Restore { id: String },

    /// Delete recovery points older than the retention window
    Prune {
        /// Override the configured retention window
        #[arg(long)]
        older_than_days: Option<u32>,

        /// Only list what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum ParamsCommand {
    /// Compare live values with the desired ones
    Validate,

    /// Full compliance report with score, grade and recommendations
    Report {
        #[arg(long)]
        json: bool,
    },

    /// Apply and persist every parameter
    Apply {
        /// Keep partial changes when a write or reload fails
        #[arg(long)]
        no_rollback: bool,
    },

    /// Apply one group of parameters without persisting them
    ApplyGroup {
        group: String,

        #[arg(long)]
        dry_run: bool,
    },

    /// List the parameter groups
    Groups,

    /// Live values, drift and persisted store details
    Audit,

    /// Set one parameter briefly, then put the original value back
    TestChange {
        name: String,
        value: String,

        /// Seconds to hold the test value
        #[arg(long, default_value_t = 10)]
        hold: u64,
    },
}

pub fn parse_categories(values: &[String]) -> Result<Vec<Category>, CliError> {
    values
        .iter()
        .map(|v| {
            Category::parse(v).ok_or_else(|| CliError::InvalidArgument {
                argument: "categories".to_string(),
                reason: format!("'{}' is not a category (expected cat1, cat2 or cat3)", v),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "stig-remediate",
            "run",
            "--dry-run",
            "--categories",
            "cat1,cat3",
            "--error-threshold",
            "3",
            "--ignore-errors",
            "--no-rollback",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(EngineConfig::default()).unwrap();
        assert!(config.dry_run);
        assert_eq!(config.categories, vec![Category::CatI, Category::CatIII]);
        assert_eq!(config.error_threshold, 3);
        assert!(config.force.ignore_errors);
        assert!(config.force.no_rollback);
        assert!(!config.force.enabled);
    }

    #[test]
    fn test_unknown_category_is_rejected() {
        let err = parse_categories(&["cat4".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument { .. }));
    }

    #[test]
    fn test_recovery_point_requires_emergency() {
        assert!(Cli::try_parse_from(["stig-remediate", "run", "--recovery-point", "x"]).is_err());

        let cli = Cli::try_parse_from([
            "stig-remediate",
            "run",
            "--emergency",
            "--recovery-point",
            "pre_stig_20240101_120000",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.apply(EngineConfig::default()).unwrap();
        assert!(config.emergency);
        assert_eq!(config.emergency_point.as_deref(), Some("pre_stig_20240101_120000"));
    }

    #[test]
    fn test_remote_flags() {
        let cli = Cli::try_parse_from([
            "stig-remediate",
            "--config",
            "/etc/stig/engine.toml",
            "remote",
            "--host",
            "admin@web01:2222",
            "--host",
            "web02",
            "--serial",
            "--max-workers",
            "8",
            "--timeout",
            "600",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/stig/engine.toml")));

        let Command::Remote(args) = cli.command else {
            panic!("expected remote");
        };
        let config = args.apply(EngineConfig::default()).unwrap();
        assert_eq!(config.hosts, vec!["admin@web01:2222".to_string(), "web02".to_string()]);
        assert!(!config.coordinator.parallel);
        assert_eq!(config.coordinator.max_workers, 8);
        assert_eq!(config.coordinator.remediation_timeout_secs, 600);
    }

    #[test]
    fn test_worker_count_is_validated() {
        let args = RemoteArgs {
            max_workers: Some(0),
            ..RemoteArgs::default()
        };
        assert!(matches!(args.apply(EngineConfig::default()), Err(CliError::Config(_))));
    }
}
