use super::settings::Settings;

/// Path of an optional YAML settings file.
pub const CONFIG_PATH_VAR: &str = "CCR_LAUNCHER_CONFIG";
/// `true` turns on streaming mode.
pub const STREAM_LOG_FILE_VAR: &str = "STREAM_LOG_FILE";
/// `false` skips content already in the log when tailing starts.
pub const SHOW_EXISTING_LOGS_VAR: &str = "SHOW_EXISTING_LOGS";

/// Environment flags override the file; unset variables leave it alone.
pub fn apply_env<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(STREAM_LOG_FILE_VAR) {
        settings.stream_log_file = value == "true";
    }
    if let Some(value) = lookup(SHOW_EXISTING_LOGS_VAR) {
        settings.show_existing_logs = value != "false";
    }
}
