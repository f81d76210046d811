use crate::models::LogLevel;
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

/// Logging setup options.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directory for daily rotated log files. No file output when `None`.
    pub log_dir: Option<Utf8PathBuf>,

    /// Prefix for log file names (e.g., "tjsdoc")
    pub log_prefix: String,

    /// Start at debug level instead of info
    pub debug_mode: bool,

    /// Also log to the console
    pub console_output: bool,

    /// Console lines as JSON objects instead of plain text
    pub json: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            log_prefix: "tjsdoc".to_string(),
            debug_mode: false,
            console_output: true,
            json: false,
        }
    }
}

/// Changes the active log level after logging was initialized.
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    pub fn set_level(&self, level: LogLevel) -> Result<()> {
        self.handle
            .reload(EnvFilter::new(level.as_filter_directive()))
            .context("Failed to change log level")?;

        tracing::debug!("log level set to {:?}", level);
        Ok(())
    }
}

impl std::fmt::Debug for LogLevelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLevelHandle").finish_non_exhaustive()
    }
}

/// Must be held for the duration of the program to keep file logging active.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    level: LogLevelHandle,
}

impl LoggingGuard {
    pub fn level_handle(&self) -> LogLevelHandle {
        self.level.clone()
    }
}

/// Setup logging with optional rotating file output and console output.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
///
/// # Errors
/// Fails when the log directory cannot be created or a global subscriber is
/// already installed.
pub fn setup_logging_with_console(options: &LoggingOptions) -> Result<LoggingGuard> {
    let initial = if options.debug_mode { "debug" } else { "info" };
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial));

    let (file_layer, file_guard) = match &options.log_dir {
        Some(log_dir) => {
            ensure_log_dir(log_dir)?;

            let file_appender = rolling::daily(log_dir, &options.log_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false) // No ANSI codes in log files
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let plain_console = (options.console_output && !options.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });
    let json_console = (options.console_output && options.json)
        .then(|| tracing_subscriber::fmt::layer().json().with_target(false));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(plain_console)
        .with(json_console)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={:?}, prefix={}, debug={}, console={}, json={}",
        options.log_dir,
        options.log_prefix,
        options.debug_mode,
        options.console_output,
        options.json
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
        level: LogLevelHandle {
            handle: reload_handle,
        },
    })
}

fn ensure_log_dir(log_dir: &Utf8PathBuf) -> Result<()> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}
