//! Fatal launcher errors.
//!
//! Every variant ends the process with a non-zero status. Transient trouble
//! (tail reads, PID marker removal, pipe errors on stdout) is absorbed where it
//! happens and never shows up here.

use std::path::PathBuf;

/// Result type for launcher operations.
pub type Result<T> = std::result::Result<T, LaunchError>;

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// The service entry point is missing.
    #[error("service executable not found: {}", path.display())]
    MissingExecutable { path: PathBuf },

    /// The service configuration file is missing.
    #[error(
        "configuration file not found: {} (mount it with -v /path/to/your/config.json:{})",
        path.display(),
        path.display()
    )]
    MissingConfig { path: PathBuf },

    #[error("cannot create log directory {}: {source}", path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The service command could not be started at all.
    #[error("failed to start service command `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no log file found in {} after {attempts} attempts", dir.display())]
    DiscoveryTimeout { dir: PathBuf, attempts: u32 },

    /// The service died before it produced a log file.
    #[error("service process exited unexpectedly during startup (exit code {code:?})")]
    ChildExited { code: Option<i32> },

    #[error("failed to register signal handlers: {0}")]
    Signals(#[source] std::io::Error),
}

impl LaunchError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        1
    }
}
