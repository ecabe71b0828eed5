use chrono::{DateTime, Local};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// File-name filter for service log files, `ccr-*.log` by default.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LogPattern {
    pub prefix: String,
    pub suffix: String,
}

impl Default for LogPattern {
    fn default() -> Self {
        Self {
            prefix: String::from("ccr-"),
            suffix: String::from(".log"),
        }
    }
}

impl LogPattern {
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix) && name.ends_with(&self.suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

impl LogFile {
    /// Local wall-clock rendering of the modification time.
    pub fn modified_display(&self) -> String {
        DateTime::<Local>::from(self.modified)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}



/*
    @@@
    @find_latest_log();
    . Lists `dir` and keeps the entries whose name matches the pattern.
    . Returns the one with the newest modification time; ties go to whichever was listed first.
    . Best-effort lookup: a missing directory or any filesystem error yields None.
*/
pub fn find_latest_log(dir: &Path, pattern: &LogPattern) -> Option<LogFile> {
    match scan(dir, pattern) {
        Ok(latest) => latest,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "log directory scan failed");
            None
        }
    }
}

fn scan(dir: &Path, pattern: &LogPattern) -> io::Result<Option<LogFile>> {
    if !dir.exists() {
        return Ok(None);
    }

    let mut latest: Option<LogFile> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !pattern.matches(name) {
            continue;
        }

        let path = entry.path();
        let modified = fs::metadata(&path)?.modified()?;
        if latest.as_ref().map_or(true, |best| modified > best.modified) {
            latest = Some(LogFile { path, modified });
        }
    }
    Ok(latest)
}
