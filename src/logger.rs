use crate::sink::SharedWriter;
use anyhow::Context;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::SubscriberBuilder;



/*
    @@@
    @init_tracing();
    . Status lines (INFO) go to `stdout`, the same SharedWriter that relays service output; WARN and ERROR go to stderr.
    . With `trace_file`, everything is also copied into a daily-rotating file through a non-blocking writer.
    . The returned guard flushes that file writer when dropped, so keep it alive until exit.
*/
pub fn init_tracing(
    stdout: SharedWriter,
    trace_file: Option<&Path>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let console = std::io::stderr
        .with_max_level(Level::WARN)
        .or_else(stdout);
    let builder = SubscriberBuilder::default()
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_max_level(Level::INFO);

    match trace_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let prefix = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| String::from("ccr-launcher.log"));
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(prefix)
                .build(dir)
                .with_context(|| format!("opening trace file in {}", dir.display()))?;
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let subscriber = builder.with_writer(console.and(non_blocking)).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("installing tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            let subscriber = builder.with_writer(console).finish();
            tracing::subscriber::set_global_default(subscriber)
                .context("installing tracing subscriber")?;
            Ok(None)
        }
    }
}
