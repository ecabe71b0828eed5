use crate::error::{LaunchError, Result};
use crate::locate::{find_latest_log, LogPattern};
use crate::sink::OutputSink;
use crate::tail::{LogTailer, StartMode, READ_CHUNK};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};


/// How the service's standard streams are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// All three streams inherited, no tailing.
    Standard,
    /// stdin inherited, stdout drained, stderr forwarded, log file tailed.
    Streaming,
}

/// How the service ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildExit {
    Code(i32),
    Signal(i32),
    /// The exit status could not be collected.
    Lost,
}

impl ChildExit {
    pub fn code(&self) -> Option<i32> {
        match self {
            ChildExit::Code(code) => Some(*code),
            _ => None,
        }
    }
}

impl From<ExitStatus> for ChildExit {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => ChildExit::Code(code),
            (None, Some(sig)) => ChildExit::Signal(sig),
            (None, None) => ChildExit::Lost,
        }
    }
}

type ExitWatch = watch::Receiver<Option<ChildExit>>;

async fn wait_exit(rx: &mut ExitWatch) -> ChildExit {
    loop {
        let current = *rx.borrow_and_update();
        if let Some(exit) = current {
            return exit;
        }
        if rx.changed().await.is_err() {
            return ChildExit::Lost;
        }
    }
}

/*
    @@@
    @ChildProcessHandle;
    . The single spawned service. A waiter task publishes two events on watch channels:
      `reaped` as soon as wait() returns, `exit` (the close event) once the captured pipes hit EOF too.
    . Liveness and signalling go by `reaped`, so a reaped pid is never signalled again.
    . `killed` is set once a termination signal has been delivered.
    . Signalling an exited child is a no-op, so cleanup may call it any number of times.
*/
pub struct ChildProcessHandle {
    pid: Option<Pid>,
    reaped: ExitWatch,
    exit: ExitWatch,
    killed: bool,
}

impl ChildProcessHandle {
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// False as soon as the process has been reaped, even if a grandchild still holds its pipes.
    pub fn is_running(&self) -> bool {
        self.reaped.borrow().is_none()
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn exit_status(&self) -> Option<ChildExit> {
        *self.reaped.borrow()
    }

    /// Resolves as soon as the process has been reaped.
    pub async fn reaped(&mut self) -> ChildExit {
        wait_exit(&mut self.reaped).await
    }

    /// Resolves once the child has exited and its captured pipes are closed.
    pub async fn exited(&mut self) -> ChildExit {
        wait_exit(&mut self.exit).await
    }

    /// Returns true if the signal was delivered.
    pub fn signal(&mut self, sig: Signal) -> bool {
        let Some(pid) = self.pid else { return false };
        if !self.is_running() {
            return false;
        }
        match kill(pid, sig) {
            Ok(()) => {
                info!(pid = pid.as_raw(), signal = ?sig, "signalled service");
                self.killed = true;
                true
            }
            Err(Errno::ESRCH) => false,
            Err(e) => {
                warn!(pid = pid.as_raw(), signal = ?sig, error = %e, "failed to signal service");
                false
            }
        }
    }

    /// Sends SIGKILL if the child is still running once `after` has elapsed.
    pub fn escalate_after(&self, after: Duration) -> JoinHandle<()> {
        let pid = self.pid;
        let mut reaped = self.reaped.clone();
        tokio::spawn(async move {
            if timeout(after, wait_exit(&mut reaped)).await.is_ok() {
                return;
            }
            if let Some(pid) = pid {
                warn!(pid = pid.as_raw(), "service ignored SIGTERM, sending SIGKILL");
                if let Err(e) = kill(pid, Signal::SIGKILL) {
                    warn!(pid = pid.as_raw(), error = %e, "failed to SIGKILL service");
                }
            }
        })
    }
}



/*
    @@@
    @spawn_service();
    . Starts `program args..` with stdin inherited and stdout/stderr wired according to `mode`.
    . Streaming: stdout is drained and dropped (the log file is the only source), stderr goes straight to the sink.
    . A waiter task reports the reap right away, and the close once both pipes hit EOF as well.
*/
pub fn spawn_service(
    program: &str,
    args: &[String],
    mode: Mode,
    sink: &OutputSink,
) -> Result<ChildProcessHandle> {
    let mut cmd = Command::new(program);
    cmd.args(args).stdin(Stdio::inherit());
    match mode {
        Mode::Standard => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
        Mode::Streaming => {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }
    }

    let mut child = cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let pid = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
    info!(program, pid = ?child.id(), "spawned service");

    let mut pipes = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        pipes.push(tokio::spawn(pump(stdout, None)));
    }
    if let Some(stderr) = child.stderr.take() {
        pipes.push(tokio::spawn(pump(stderr, Some(sink.clone()))));
    }

    let (reaped_tx, reaped_rx) = watch::channel(None);
    let (exit_tx, exit_rx) = watch::channel(None);
    tokio::spawn(async move {
        let exit = match child.wait().await {
            Ok(status) => ChildExit::from(status),
            Err(e) => {
                warn!(error = %e, "could not collect service exit status");
                ChildExit::Lost
            }
        };
        // published in the same poll that reaped the pid
        let _ = reaped_tx.send(Some(exit));
        for pipe in pipes {
            let _ = pipe.await;
        }
        let _ = exit_tx.send(Some(exit));
    });

    Ok(ChildProcessHandle {
        pid,
        reaped: reaped_rx,
        exit: exit_rx,
        killed: false,
    })
}

// Reads a child pipe to EOF, forwarding to `sink` when given.
async fn pump<R>(mut pipe: R, sink: Option<OutputSink>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Some(sink) = &sink {
                    sink.write(&buf[..n]).await;
                }
            }
        }
    }
}



/// Attempts made so far at finding the service log.
#[derive(Debug)]
pub struct PollState {
    attempts: u32,
    max: u32,
}

impl PollState {
    pub fn new(max: u32) -> Self {
        Self { attempts: 0, max }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Counts a miss; false once the budget is spent.
    pub fn record_miss(&mut self) -> bool {
        self.attempts += 1;
        self.attempts < self.max
    }
}

/// Where to look for the log file and how to follow it.
#[derive(Debug, Clone)]
pub struct TailPlan {
    pub logs_dir: PathBuf,
    pub pattern: LogPattern,
    pub start: StartMode,
    pub interval: Duration,
    pub discovery_attempts: u32,
}

/*
    @@@
    @Supervisor;
    . Owns the child handle, the discovery counter and the tail task; nothing else mutates them.
    . Discovery runs one step per tick until the log shows up, the child dies, or the budget runs out.
*/
pub struct Supervisor {
    program: String,
    args: Vec<String>,
    mode: Mode,
    sink: OutputSink,
    plan: TailPlan,
    child: Option<ChildProcessHandle>,
    discovery: Option<PollState>,
    tailer: Option<JoinHandle<()>>,
    escalation: Option<JoinHandle<()>>,
}

impl Supervisor {
    pub fn new(program: String, args: Vec<String>, mode: Mode, sink: OutputSink, plan: TailPlan) -> Self {
        Self {
            program,
            args,
            mode,
            sink,
            plan,
            child: None,
            discovery: None,
            tailer: None,
            escalation: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn child(&self) -> Option<&ChildProcessHandle> {
        self.child.as_ref()
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_some()
    }

    pub fn is_tailing(&self) -> bool {
        self.tailer.is_some()
    }

    pub fn spawn(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let child = spawn_service(&self.program, &self.args, self.mode, &self.sink)?;
        self.child = Some(child);
        if self.mode == Mode::Streaming {
            self.discovery = Some(PollState::new(self.plan.discovery_attempts));
        }
        Ok(())
    }

    /// Resolves when the child exits; pending forever if there is none.
    pub async fn child_exited(&mut self) -> ChildExit {
        match self.child.as_mut() {
            Some(child) => child.exited().await,
            None => std::future::pending().await,
        }
    }

    /// One discovery attempt. Errors are fatal to the launcher.
    pub async fn discover_step(&mut self) -> Result<()> {
        let Some(poll) = self.discovery.as_mut() else { return Ok(()) };

        if !self.child.as_ref().is_some_and(|c| c.is_running()) {
            let code = self
                .child
                .as_ref()
                .and_then(|c| c.exit_status())
                .and_then(|e| e.code());
            error!(?code, "service process exited unexpectedly");
            self.discovery = None;
            return Err(LaunchError::ChildExited { code });
        }

        if let Some(log) = find_latest_log(&self.plan.logs_dir, &self.plan.pattern) {
            info!(path = %log.path.display(), modified = %log.modified_display(), "Log file found");
            self.discovery = None;
            self.start_tailing(log.path).await;
            return Ok(());
        }

        if !poll.record_miss() {
            let attempts = poll.attempts();
            error!(attempts, "no log file found, giving up");
            self.discovery = None;
            self.terminate_child();
            return Err(LaunchError::DiscoveryTimeout {
                dir: self.plan.logs_dir.clone(),
                attempts,
            });
        }
        info!("Waiting for log file... ({}/{})", poll.attempts(), poll.max());
        Ok(())
    }

    pub async fn start_tailing(&mut self, path: PathBuf) {
        if self.tailer.is_some() {
            return;
        }
        let tailer = LogTailer::start(path, self.plan.start, self.sink.clone(), self.plan.interval).await;
        self.tailer = Some(tokio::spawn(tailer.run()));
    }

    /// Cancels the tail task and any pending discovery. Safe to repeat.
    pub fn stop_tailing(&mut self) {
        self.discovery = None;
        if let Some(task) = self.tailer.take() {
            task.abort();
        }
    }

    /// SIGTERM without escalation. Returns true if the signal was delivered.
    pub fn terminate_child(&mut self) -> bool {
        self.child
            .as_mut()
            .map_or(false, |child| child.signal(Signal::SIGTERM))
    }

    /// SIGTERM, then SIGKILL if the child outlives `kill_timeout`.
    pub fn terminate_with_escalation(&mut self, kill_timeout: Duration) {
        if !self.terminate_child() || self.escalation.is_some() {
            return;
        }
        if let Some(child) = self.child.as_ref() {
            self.escalation = Some(child.escalate_after(kill_timeout));
        }
    }
}
