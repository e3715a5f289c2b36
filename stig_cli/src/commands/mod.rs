//! Process runner configurations for the transports the CLI builds
//!
//! Provides allowlisted runners for local remediation and SSH fan-out.

pub mod ssh;

pub use ssh::create_ssh_runner;
pub use stig_engine::transport::create_remediation_runner;
