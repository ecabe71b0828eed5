use crate::locate::LogPattern;
use crate::runtime::Mode;
use crate::tail::StartMode;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::env::{apply_env, CONFIG_PATH_VAR};

/// The wrapped service: `program script args..`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ServiceCommand {
    pub program: String,
    pub script: PathBuf,
    pub args: Vec<String>,
}

impl Default for ServiceCommand {
    fn default() -> Self {
        Self {
            program: String::from("node"),
            script: PathBuf::from("/app/node_modules/@musistudio/claude-code-router/dist/cli.js"),
            args: vec![String::from("start")],
        }
    }
}

impl ServiceCommand {
    /// Arguments passed to `program`: the script path first.
    pub fn argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.script.to_string_lossy().into_owned());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Timings {
    pub discovery_interval_ms: u64,
    pub discovery_attempts: u32,
    pub tail_interval_ms: u64,
    pub kill_timeout_ms: u64,
    pub exit_grace_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 1000,
            discovery_attempts: 20,
            tail_interval_ms: 1000,
            kill_timeout_ms: 5000,
            exit_grace_ms: 200,
        }
    }
}

// tokio intervals reject a zero period
fn period(ms: u64) -> Duration {
    Duration::from_millis(ms.max(1))
}

impl Timings {
    pub fn discovery_interval(&self) -> Duration {
        period(self.discovery_interval_ms)
    }

    pub fn tail_interval(&self) -> Duration {
        period(self.tail_interval_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceCommand,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub pid_file: PathBuf,
    pub log_pattern: LogPattern,
    pub stream_log_file: bool,
    pub show_existing_logs: bool,
    pub wait_for_exit: bool,
    pub trace_file: Option<PathBuf>,
    pub timings: Timings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            service: ServiceCommand::default(),
            config_file: PathBuf::from("/root/.claude-code-router/config.json"),
            logs_dir: PathBuf::from("/root/.claude-code-router/logs"),
            pid_file: PathBuf::from("/root/.claude-code-router/.claude-code-router.pid"),
            log_pattern: LogPattern::default(),
            stream_log_file: false,
            show_existing_logs: true,
            wait_for_exit: false,
            trace_file: None,
            timings: Timings::default(),
        }
    }
}

impl Settings {
    /// Defaults, then the YAML file named by `CCR_LAUNCHER_CONFIG`, then env flags.
    pub fn load() -> anyhow::Result<Settings> {
        let lookup = |key: &str| std::env::var(key).ok();
        let mut settings = match lookup(CONFIG_PATH_VAR) {
            Some(path) => parser(Path::new(&path))?,
            None => Settings::default(),
        };
        apply_env(&mut settings, lookup);
        Ok(settings)
    }

    pub fn mode(&self) -> Mode {
        if self.stream_log_file {
            Mode::Streaming
        } else {
            Mode::Standard
        }
    }

    pub fn start_mode(&self) -> StartMode {
        StartMode::from_flag(self.show_existing_logs)
    }
}



/*
    @@@
    @parser();
    . Reads the launcher's own YAML settings file into a String. Any I/O error is returned with the path attached.
    . Hands the raw YAML text to serde_yaml; missing keys fall back to the defaults, malformed YAML is an error.
*/
pub fn parser(path: &Path) -> anyhow::Result<Settings> {
    let yaml_file = fs::read_to_string(path)
        .with_context(|| format!("reading launcher settings {}", path.display()))?;
    let parsed: Settings = serde_yaml::from_str(&yaml_file)
        .with_context(|| format!("parsing launcher settings {}", path.display()))?;
    Ok(parsed)
}
