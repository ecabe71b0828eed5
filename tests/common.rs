#![allow(dead_code)]

use ccr_launcher::parse::{Settings, Timings};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::AsyncWrite;

/// Stand-in for the launcher's stdout.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl AsyncWrite for Capture {
    fn poll_write(self: Pin<&mut Self>, _cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Settings rooted in `dir`, with `script` run by `sh` as the service.
pub fn sh_service(dir: &Path, script: &str) -> Settings {
    let script_path = dir.join("service.sh");
    fs::write(&script_path, script).unwrap();
    fs::write(dir.join("config.json"), "{}").unwrap();
    fs::create_dir_all(dir.join("logs")).unwrap();

    let mut s = Settings::default();
    s.service.program = "sh".into();
    s.service.script = script_path;
    s.service.args = Vec::new();
    s.config_file = dir.join("config.json");
    s.logs_dir = dir.join("logs");
    s.pid_file = dir.join("ccr.pid");
    s.timings = Timings {
        discovery_interval_ms: 25,
        discovery_attempts: 20,
        tail_interval_ms: 25,
        kill_timeout_ms: 400,
        exit_grace_ms: 50,
    };
    s
}

/// Polls until `path` exists or `within` elapses.
pub async fn wait_for_file(path: &Path, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    path.exists()
}

pub fn marker(dir: &Path) -> PathBuf {
    dir.join("got-term")
}
