//! Runtime support for the STIG remediation engine: structured logging,
//! compile-time limits and environment-driven preferences.

pub mod limits;
#[macro_use]
pub mod logging;
pub mod preferences;

pub use logging::{Code, LogEvent, LogLevel, LoggingService};
pub use preferences::LoggingPreferences;
