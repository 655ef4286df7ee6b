//! # Logging Utilities
//!
//! Logging infrastructure for hwwatch using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Pretty (development) or JSON (production) output
//! - Environment variable configuration
//! - Log level filtering, including per-module `RUST_LOG` directives
//! - Optional daily-rolling file output next to the console
//!
//! Trigger reports are logged under the `hwwatch::trigger` target, so they can
//! be filtered separately: `RUST_LOG=warn,hwwatch::trigger=info`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hwwatch_utils::init_logging;
//!
//! // Reads RUST_LOG, HWWATCH_LOG_FORMAT, HWWATCH_LOG_FILE
//! let _guard = init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("watching");
//! ```
//!
//! Keep the returned [`LogGuard`] alive for the life of the process: dropping
//! it flushes and stops the background file writer.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level filter (e.g., `RUST_LOG=debug`, `RUST_LOG=hwwatch_core=debug`)
//! - `HWWATCH_LOG_FORMAT`: Set output format (`json` or `pretty`, default: `pretty`)
//! - `HWWATCH_LOG_FILE`: Optional path to log file (if not set, logs only to console)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const LOG_FORMAT_ENV: &str = "HWWATCH_LOG_FORMAT";
/// Environment variable naming an additional log file.
pub const LOG_FILE_ENV: &str = "HWWATCH_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON format, one object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(format!("Unknown log format: {s}. Use 'pretty' or 'json'")),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level
    Debug,
    /// Trace level (most verbose)
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!(
                "Unknown log level: {s}. Use 'error', 'warn', 'info', 'debug', or 'trace'"
            )),
        }
    }
}

/// Everything needed to set up the subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings
{
    /// Explicit level. Takes precedence over `RUST_LOG` when set.
    pub level: Option<LogLevel>,
    /// Output format.
    pub format: LogFormat,
    /// Additional log file (rolled daily).
    pub file: Option<PathBuf>,
}

impl LogSettings
{
    /// Settings from `HWWATCH_LOG_FORMAT` / `HWWATCH_LOG_FILE`. Unknown formats
    /// fall back to pretty.
    #[must_use]
    pub fn from_env() -> Self
    {
        Self {
            level: None,
            format: env::var(LOG_FORMAT_ENV)
                .ok()
                .and_then(|s| LogFormat::from_str(&s).ok())
                .unwrap_or_default(),
            file: env::var(LOG_FILE_ENV).ok().filter(|s| !s.is_empty()).map(PathBuf::from),
        }
    }

    /// Override the level (from a `--log-level` flag, for instance).
    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    fn filter(&self) -> EnvFilter
    {
        // Priority:
        // 1. Explicit level (CLI flag)
        // 2. RUST_LOG (supports module-specific filters like "hwwatch_core=debug")
        // 3. INFO
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Keeps the background file writer running. Drop it last.
#[derive(Debug)]
pub struct LogGuard
{
    _file: Option<WorkerGuard>,
}

/// Initialize logging from the environment.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file's directory cannot be created.
pub fn init_logging() -> Result<LogGuard, LoggingError>
{
    init_logging_with(&LogSettings::from_env())
}

/// Initialize logging with explicit settings.
///
/// ## Example
///
/// ```rust,no_run
/// use hwwatch_utils::{init_logging_with, LogFormat, LogLevel, LogSettings};
///
/// let settings = LogSettings {
///     level: Some(LogLevel::Debug),
///     format: LogFormat::Json,
///     file: None,
/// };
/// let _guard = init_logging_with(&settings).expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed or the log
/// file's directory cannot be created.
pub fn init_logging_with(settings: &LogSettings) -> Result<LogGuard, LoggingError>
{
    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(settings.format, io::stdout, true)
        .with_filter(settings.filter())
        .boxed()];

    let file_guard = match &settings.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            layers.push(
                fmt_layer(settings.format, writer, false) // No ANSI in files
                    .with_filter(settings.filter())
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;

    Ok(LogGuard { _file: file_guard })
}

fn fmt_layer<W>(format: LogFormat, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn file_writer(path: &Path) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError>
{
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    std::fs::create_dir_all(directory)?;

    let appender = tracing_appender::rolling::daily(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Log file path has no file name
    #[error("Invalid log file path: {0}")]
    InvalidPath(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_log_format_from_str()
    {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("dev").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("prod").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_from_str()
    {
        assert_eq!(LogLevel::from_str("error").unwrap(), LogLevel::Error);
        assert_eq!(LogLevel::from_str("warning").unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::from_str("info").unwrap(), LogLevel::Info);
        assert_eq!(LogLevel::from_str("dbg").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("trace").unwrap(), LogLevel::Trace);
        assert!(LogLevel::from_str("invalid").is_err());
    }

    #[test]
    fn test_log_level_to_tracing_level()
    {
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_with_level_only_overrides_when_set()
    {
        let settings = LogSettings::default().with_level(Some(LogLevel::Debug));
        assert_eq!(settings.level, Some(LogLevel::Debug));
        assert_eq!(settings.clone().with_level(None).level, Some(LogLevel::Debug));
    }

    #[test]
    fn test_file_writer_rejects_directory_only_path()
    {
        assert!(matches!(file_writer(Path::new("/")), Err(LoggingError::InvalidPath(_))));
    }
}
