//! Structured logging setup with console and file output.
//!
//! Interactive terminals get stdout only. Otherwise output also goes to a daily
//! rotating file, falling back to console-only when the file can't be opened.
//! The filter comes from `TABULA_LOG`, then `RUST_LOG`, then a build-type default.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "TABULA_LOG";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is a terminal
    pub is_pty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_pty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Force file logging on or off regardless of the terminal check.
    pub fn with_file_output(mut self, enabled: bool) -> Self {
        self.is_pty = !enabled;
        self
    }
}

/// Guard that must be held for as long as logs should be written.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    worker_guard: Option<WorkerGuard>,
}

impl LoggingGuard {
    /// Whether a log file is being written.
    pub fn has_file_output(&self) -> bool {
        self.worker_guard.is_some()
    }
}

/// Install the global subscriber.
///
/// If a subscriber is already installed (by the host application or an earlier
/// call) the existing one is kept.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_pty {
        return init_stdout_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {e}. Using console only.");
            init_stdout_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with defaults.
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_stdout_logging(filter: Option<&str>) -> LoggingGuard {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Subscriber already installed; keeping it");
    }

    LoggingGuard { worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("tabula")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout = std::io::stdout.with_max_level(tracing::Level::INFO);
    let combined = stdout.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()
        .map_err(|e| e.to_string())?;

    Ok(guard)
}

/// Build the environment filter.
///
/// Priority: custom filter, `TABULA_LOG`, `RUST_LOG`, then [`default_log_filter`].
pub fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "debug,tabula_core=trace,tokio_postgres=warn,deadpool=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "info,tabula_core=info,tokio_postgres=warn,deadpool=warn"
    }
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("tabula"))
        .unwrap_or_else(|| PathBuf::from("./tabula_data"))
        .join("logs")
}
