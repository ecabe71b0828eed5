use crate::error::{LaunchError, Result};
use crate::parse::Settings;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};



/*
    @@@
    @check_environment();
    . The service entry point and its config file must already exist.
    . The log directory is created (with parents) when missing.
    . Nothing is spawned if any of this fails.
*/
pub fn check_environment(settings: &Settings) -> Result<()> {
    if !settings.service.script.exists() {
        return Err(LaunchError::MissingExecutable {
            path: settings.service.script.clone(),
        });
    }
    if !settings.config_file.exists() {
        return Err(LaunchError::MissingConfig {
            path: settings.config_file.clone(),
        });
    }
    fs::create_dir_all(&settings.logs_dir).map_err(|source| LaunchError::LogDir {
        path: settings.logs_dir.clone(),
        source,
    })?;
    Ok(())
}

/// Removes a stale PID marker left by a previous run. Never fatal.
pub fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => info!(path = %path.display(), "removed stale PID file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no PID file to remove")
        }
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove PID file"),
    }
}
