use crate::sink::OutputSink;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, trace};

/// Upper bound on a single read from the log file.
pub const READ_CHUNK: usize = 16 * 1024;

/// What to do with content already in the file when tailing starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Replay,
    TailOnly,
}

impl StartMode {
    pub fn from_flag(show_existing: bool) -> Self {
        if show_existing {
            StartMode::Replay
        } else {
            StartMode::TailOnly
        }
    }
}

/// Read position in the followed log file.
#[derive(Debug)]
pub struct TailCursor {
    path: PathBuf,
    position: u64,
    reading: bool,
}

impl TailCursor {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn is_reading(&self) -> bool {
        self.reading
    }

    // never moves backwards, even if the file was truncated
    fn advance_to(&mut self, observed: u64) {
        if observed > self.position {
            self.position = observed;
        }
    }
}

// Some(size observed at stat time) on success, None when the read failed.
type ReadOutcome = Option<u64>;

pub struct LogTailer {
    cursor: TailCursor,
    sink: OutputSink,
    interval: Duration,
    done_tx: mpsc::Sender<ReadOutcome>,
    done_rx: mpsc::Receiver<ReadOutcome>,
}



/*
    @@@
    @LogTailer::start();
    . Replay: forwards the whole current file once and puts the cursor at the number of bytes sent.
    . TailOnly: puts the cursor at the current file size and forwards nothing.
    . A file that can't be read or stat'ed starts the cursor at zero.
*/
impl LogTailer {
    pub async fn start(path: PathBuf, mode: StartMode, sink: OutputSink, interval: Duration) -> Self {
        let position = match mode {
            StartMode::Replay => match tokio::fs::read(&path).await {
                Ok(existing) => {
                    sink.write(&existing).await;
                    existing.len() as u64
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "could not replay existing log");
                    0
                }
            },
            StartMode::TailOnly => match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "could not stat log");
                    0
                }
            },
        };

        let (done_tx, done_rx) = mpsc::channel(1);
        Self {
            cursor: TailCursor { path, position, reading: false },
            sink,
            interval,
            done_tx,
            done_rx,
        }
    }

    pub fn cursor(&self) -> &TailCursor {
        &self.cursor
    }

    /// Polls forever; the owner stops it by aborting the task.
    pub async fn run(mut self) {
        let mut ticker = time::interval_at(time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick().await;
                }
                Some(outcome) = self.done_rx.recv() => {
                    self.finish_read(outcome);
                }
            }
        }
    }

    /// One complete poll: start a read if the file grew and wait for it.
    pub async fn poll(&mut self) {
        if self.on_tick().await {
            if let Some(outcome) = self.done_rx.recv().await {
                self.finish_read(outcome);
            }
        }
    }

    // Returns true when a read was started.
    async fn on_tick(&mut self) -> bool {
        if self.cursor.reading {
            trace!(path = %self.cursor.path.display(), "read in flight, skipping tick");
            return false;
        }

        let size = match tokio::fs::metadata(&self.cursor.path).await {
            Ok(meta) => meta.len(),
            Err(err) => {
                trace!(error = %err, "log stat failed");
                return false;
            }
        };
        if size <= self.cursor.position {
            return false;
        }

        self.cursor.reading = true;
        let path = self.cursor.path.clone();
        let start = self.cursor.position;
        let sink = self.sink.clone();
        let done = self.done_tx.clone();
        tokio::spawn(async move {
            let outcome = match forward_range(&path, start, size, &sink).await {
                Ok(()) => Some(size),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "log read failed, retrying next tick");
                    None
                }
            };
            let _ = done.send(outcome).await;
        });
        true
    }

    fn finish_read(&mut self, outcome: ReadOutcome) {
        self.cursor.reading = false;
        if let Some(observed) = outcome {
            self.cursor.advance_to(observed);
        }
    }
}

// Streams [start, end) to the sink in READ_CHUNK pieces.
async fn forward_range(path: &Path, start: u64, end: u64, sink: &OutputSink) -> io::Result<()> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;
    let mut reader = file.take(end - start);

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        sink.write(&buf[..n]).await;
    }
    Ok(())
}
