mod env;
mod settings;

pub use env::{apply_env, CONFIG_PATH_VAR, SHOW_EXISTING_LOGS_VAR, STREAM_LOG_FILE_VAR};
pub use settings::{parser, ServiceCommand, Settings, Timings};
