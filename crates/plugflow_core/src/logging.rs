//! Process logging bootstrap.
//!
//! # Responsibility
//! - Initialize rolling file logs, or stderr logs when no directory is
//!   configured, once per process.
//! - Mirror file-log warnings and errors to stderr for interactive hosts.
//!
//! # Invariants
//! - Initialization is idempotent for the same level and sink.
//! - Re-initialization with a different level or sink is rejected.
//! - Initialization never panics.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const LOG_FILE_BASENAME: &str = "plugflow";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();
static PANIC_HOOK_INSTALLED: OnceCell<()> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    // `None` when logging to stderr.
    log_dir: Option<PathBuf>,
    _logger: LoggerHandle,
}

/// Starts file logging at `level` under the absolute directory `log_dir`.
///
/// # Errors
/// - `level` is not one of trace|debug|info|warn|error.
/// - `log_dir` is empty, relative, or cannot be created.
/// - Logging is already active with a different level or directory.
pub fn init_logging(level: &str, log_dir: &str) -> Result<(), String> {
    let level = normalize_level(level)?;
    let log_dir = normalize_log_dir(log_dir)?;
    activate(level, Some(log_dir))
}

/// Starts logging to stderr at `level`, for hosts without a log directory.
///
/// # Errors
/// - `level` is not one of trace|debug|info|warn|error.
/// - Logging is already active with a different level or a log directory.
pub fn init_stderr_logging(level: &str) -> Result<(), String> {
    activate(normalize_level(level)?, None)
}

fn activate(level: &'static str, log_dir: Option<PathBuf>) -> Result<(), String> {
    let state = LOGGING_STATE.get_or_try_init(|| match &log_dir {
        Some(dir) => start_file_logger(level, dir),
        None => start_stderr_logger(level),
    })?;
    if state.log_dir != log_dir {
        return Err(format!(
            "logging already initialized at {}; refusing to switch to {}",
            sink_name(state.log_dir.as_deref()),
            sink_name(log_dir.as_deref())
        ));
    }
    if state.level != level {
        return Err(format!(
            "logging already initialized with level `{}`; refusing to switch to `{level}`",
            state.level
        ));
    }
    Ok(())
}

fn sink_name(log_dir: Option<&Path>) -> String {
    match log_dir {
        Some(dir) => format!("`{}`", dir.display()),
        None => "stderr".to_string(),
    }
}

fn start_file_logger(level: &'static str, log_dir: &Path) -> Result<LoggingState, String> {
    std::fs::create_dir_all(log_dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            log_dir.display()
        )
    })?;

    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_file(
            FileSpec::default()
                .directory(log_dir)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .duplicate_to_stderr(Duplicate::Warn)
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    announce(level, &log_dir.display().to_string());
    Ok(LoggingState {
        level,
        log_dir: Some(log_dir.to_path_buf()),
        _logger: logger,
    })
}

fn start_stderr_logger(level: &'static str) -> Result<LoggingState, String> {
    let logger = Logger::try_with_str(level)
        .map_err(|err| format!("invalid log level `{level}`: {err}"))?
        .log_to_stderr()
        .format_for_stderr(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    announce(level, "stderr");
    Ok(LoggingState {
        level,
        log_dir: None,
        _logger: logger,
    })
}

fn announce(level: &str, sink: &str) {
    install_panic_hook_once();

    info!(
        "event=host_start module=logging status=ok platform={} build_mode={} version={}",
        std::env::consts::OS,
        build_mode(),
        env!("CARGO_PKG_VERSION")
    );
    info!("event=logging_init module=logging status=ok level={level} sink={sink}");
}

/// Active `(level, log_dir)`, or `None` before logging starts. The directory
/// is `None` for stderr logging.
pub fn logging_status() -> Option<(&'static str, Option<PathBuf>)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.log_dir.clone()))
}

/// `debug` in debug builds, `info` in release builds.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" | "critical" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn normalize_log_dir(log_dir: &str) -> Result<PathBuf, String> {
    let trimmed = log_dir.trim();
    if trimmed.is_empty() {
        return Err("log_dir cannot be empty".to_string());
    }
    let path = Path::new(trimmed);
    if !path.is_absolute() {
        return Err(format!("log_dir must be an absolute path, got `{trimmed}`"));
    }
    Ok(path.to_path_buf())
}

fn build_mode() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "release"
    }
}

fn install_panic_hook_once() {
    if PANIC_HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = crate::extension::panic_message(panic_info.payload());
        error!("event=panic_captured module=logging status=error location={location} payload={payload}");
        previous_hook(panic_info);
    }));
}

/// Collapses line breaks and caps length so untrusted text stays on one
/// log line.
pub(crate) fn sanitize_message(value: &str, max_chars: usize) -> String {
    let normalized = value.replace(['\n', '\r'], " ");
    let mut truncated = normalized.chars().take(max_chars).collect::<String>();
    if normalized.chars().count() > max_chars {
        truncated.push_str("...");
    }
    truncated
}
