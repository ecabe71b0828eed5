use ccr_launcher::control::launch;
use ccr_launcher::logger::init_tracing;
use ccr_launcher::parse::Settings;
use ccr_launcher::sink::{OutputSink, SharedWriter};
use std::process::ExitCode;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(1);
        }
    };

    let stdout = SharedWriter::stdout();
    let guard = match init_tracing(stdout.clone(), settings.trace_file.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(1);
        }
    };

    let code = launch(settings, OutputSink::shared(stdout)).await;
    drop(guard);
    ExitCode::from(code)
}
