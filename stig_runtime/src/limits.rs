//! Compile-time ceilings
//!
//! These bound what runtime configuration may request. They are not user
//! preferences and cannot be raised from a config file.

pub mod coordination {
    /// Upper bound on concurrent host workers regardless of configuration
    pub const MAX_WORKERS_CEILING: usize = 64;

    /// Default number of concurrent host workers
    pub const DEFAULT_MAX_WORKERS: usize = 5;

    /// Bytes of remote output kept per host result
    pub const MAX_CAPTURED_OUTPUT_BYTES: usize = 256 * 1024;
}

pub mod execution {
    /// Default timeout for a discrete command (5 minutes)
    pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;

    /// Default timeout for a full remote remediation run (1 hour)
    pub const DEFAULT_REMEDIATION_TIMEOUT_SECS: u64 = 3600;

    /// Smallest timeout accepted from configuration
    pub const MIN_TIMEOUT_SECS: u64 = 1;

    /// PATH handed to child processes after the environment is cleared
    pub const RESTRICTED_PATH: &str = "/usr/bin:/bin:/usr/sbin:/sbin";
}

pub mod remediation {
    /// Default error budget before a run aborts
    pub const DEFAULT_MAX_FAILED_COMMANDS: usize = 10;

    /// Default free-space floor for the pre-flight gate
    pub const DEFAULT_MIN_FREE_SPACE_MB: u64 = 500;

    /// Default recovery point retention window
    pub const DEFAULT_RETENTION_DAYS: u32 = 30;
}

pub mod logging {
    /// Events retained by in-memory sinks
    pub const EVENT_BUFFER_SIZE: usize = 10_000;

    /// Events retained per host by the host event collector
    pub const MAX_EVENTS_PER_HOST: usize = 1_000;
}
