use crate::error::Result;
use crate::parse::{Settings, Timings};
use crate::preflight::{check_environment, remove_pid_file};
use crate::runtime::{Mode, Supervisor, TailPlan};
use crate::sink::OutputSink;
use crate::LaunchError;
use futures::{Stream, StreamExt};
use signal_hook::consts::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use tokio::time::{interval_at, sleep, timeout, Instant};
use tracing::{error, info, warn};


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Running,
    Stopping,
    Stopped,
}

/*
    @@@
    @Controller;
    . Drives one launcher run: spawn, wait for a stop trigger, clean up, pick the exit status.
    . Stop triggers are a termination signal (any mode) or the service closing on its own (streaming).
    . Holds the only Supervisor; every handler reaches the child and tail task through it.
*/
pub struct Controller {
    supervisor: Supervisor,
    timings: Timings,
    wait_for_exit: bool,
    state: LifecycleState,
}

impl Controller {
    pub fn new(settings: &Settings, sink: OutputSink) -> Self {
        let plan = TailPlan {
            logs_dir: settings.logs_dir.clone(),
            pattern: settings.log_pattern.clone(),
            start: settings.start_mode(),
            interval: settings.timings.tail_interval(),
            discovery_attempts: settings.timings.discovery_attempts,
        };
        let supervisor = Supervisor::new(
            settings.service.program.clone(),
            settings.service.argv(),
            settings.mode(),
            sink,
            plan,
        );
        Self {
            supervisor,
            timings: settings.timings.clone(),
            wait_for_exit: settings.wait_for_exit,
            state: LifecycleState::Running,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Spawns the service and supervises it until the launcher should exit.
    pub async fn run<S>(&mut self, signals: S) -> Result<u8>
    where
        S: Stream<Item = i32> + Unpin,
    {
        match self.supervisor.mode() {
            Mode::Standard => {
                info!("--> Log streaming is DISABLED. Starting service in standard foreground mode.");
                self.supervisor.spawn()?;
                self.run_standard(signals).await
            }
            Mode::Streaming => {
                info!("--> Log streaming is ENABLED.");
                self.supervisor.spawn()?;
                self.run_streaming(signals).await
            }
        }
    }

    async fn run_standard<S>(&mut self, mut signals: S) -> Result<u8>
    where
        S: Stream<Item = i32> + Unpin,
    {
        let mut signals_open = true;
        loop {
            tokio::select! {
                signum = signals.next(), if signals_open => match signum {
                    Some(signum) => {
                        info!(signal = signum, "received stop signal");
                        return Ok(self.shutdown().await);
                    }
                    None => signals_open = false,
                },
                exit = self.supervisor.child_exited() => {
                    let code = exit.code().unwrap_or(0);
                    info!(exit = ?exit, "service process exited");
                    self.state = LifecycleState::Stopped;
                    return Ok(u8::try_from(code).unwrap_or(1));
                }
            }
        }
    }

    async fn run_streaming<S>(&mut self, mut signals: S) -> Result<u8>
    where
        S: Stream<Item = i32> + Unpin,
    {
        info!("--> Waiting for the service to start and create a log file...");
        let period = self.timings.discovery_interval();
        let mut discovery = interval_at(Instant::now() + period, period);
        let mut signals_open = true;

        loop {
            let discovering = self.supervisor.is_discovering();
            tokio::select! {
                signum = signals.next(), if signals_open => match signum {
                    Some(signum) => {
                        info!(signal = signum, "received stop signal");
                        return Ok(self.shutdown().await);
                    }
                    None => signals_open = false,
                },
                exit = self.supervisor.child_exited() => {
                    if self.supervisor.is_discovering() {
                        error!(exit = ?exit, "service process exited before creating a log file");
                        self.state = LifecycleState::Stopped;
                        self.supervisor.stop_tailing();
                        return Err(LaunchError::ChildExited { code: exit.code() });
                    }
                    info!("CCR process exited with code {:?}", exit.code());
                    return Ok(self.shutdown().await);
                }
                _ = discovery.tick(), if discovering => {
                    if let Err(err) = self.supervisor.discover_step().await {
                        self.state = LifecycleState::Stopped;
                        return Err(err);
                    }
                }
            }
        }
    }

    /*
        @@@
        @shutdown();
        . RUNNING -> STOPPING: cancel tailing, SIGTERM the child and arm the SIGKILL escalation.
        . STOPPING -> STOPPED after the fixed grace delay, whether or not the child is gone yet.
        . With `wait_for_exit`, waits for the exit instead, bounded by the kill timeout plus the grace delay.
        . Any call after the first is a no-op.
    */
    pub async fn shutdown(&mut self) -> u8 {
        if self.state != LifecycleState::Running {
            return 0;
        }
        self.state = LifecycleState::Stopping;
        info!("--> Received stop signal. Cleaning up background processes...");

        self.supervisor.stop_tailing();
        self.supervisor.terminate_with_escalation(self.timings.kill_timeout());

        if self.wait_for_exit {
            let bound = self.timings.kill_timeout() + self.timings.exit_grace();
            if timeout(bound, self.supervisor.child_exited()).await.is_err() {
                warn!(waited = ?bound, "service still running, exiting anyway");
            }
        } else {
            sleep(self.timings.exit_grace()).await;
        }

        self.state = LifecycleState::Stopped;
        info!("--> Cleanup complete. Exiting.");
        0
    }
}



/*
    @@@
    @launch();
    . Checks the environment, clears the PID marker and registers SIGTERM/SIGINT/SIGQUIT before anything is spawned.
    . Runs the Controller against `out` and the real signal stream.
    . Every fatal error is reported once and mapped to its exit status.
*/
pub async fn launch(settings: Settings, out: OutputSink) -> u8 {
    match launch_inner(&settings, out).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    }
}

async fn launch_inner(settings: &Settings, out: OutputSink) -> Result<u8> {
    check_environment(settings)?;

    info!("--> Service is starting...");
    info!("--> Logs will be written to {}.", settings.logs_dir.display());
    info!(
        "--> Mount the log directory to keep them: -v /path/to/your/logs:{}",
        settings.logs_dir.display()
    );
    remove_pid_file(&settings.pid_file);

    let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT]).map_err(LaunchError::Signals)?;
    let handle = signals.handle();

    let mut controller = Controller::new(settings, out);
    let outcome = controller.run(signals).await;
    handle.close();
    outcome
}
