//! Logging configuration and initialization
//!
//! The allocator itself only emits `tracing` events: `trace` per allocation,
//! `debug` for page creation, rotation, reuse and cleanup, `info` for
//! initialize/shutdown, `warn` for misuse such as a decreasing marker.
//! Binaries and tests install a subscriber through this module.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., "info", "pageforge=trace")
//! - `PAGEFORGE_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//! - `PAGEFORGE_LOG_FORMAT`: Output format ("human" or "json")
//! - `PAGEFORGE_LOG_FILE`: Optional file path for an extra JSON log

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "PAGEFORGE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "PAGEFORGE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "PAGEFORGE_LOG_FILE";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("failed to open log file {path}: {reason}")]
    FileOpenFailed { path: PathBuf, reason: String },

    /// Another global subscriber was installed first
    #[error("failed to install subscriber: {0}")]
    SubscriberInit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }

    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(LoggingError::InvalidLogLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Colored human-readable lines
    #[default]
    Human,
    /// One JSON object per event
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" | "console" => Ok(LogFormat::Human),
            "json" | "structured" => Ok(LogFormat::Json),
            other => Err(LoggingError::InvalidLogFormat(other.to_string())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file and line of each event on the console
    pub with_file_info: bool,
    /// Mirror every event as JSON into this file
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    pub fn with_log_file(mut self, path: PathBuf) -> Self {
        self.log_file = Some(path);
        self
    }

    /// Read `PAGEFORGE_LOG_*` variables; unset or unparsable ones keep defaults
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(level) = std::env::var(LOG_LEVEL_ENV).ok().and_then(|s| s.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = std::env::var(LOG_FORMAT_ENV).ok().and_then(|s| s.parse().ok()) {
            config.format = format;
        }
        if let Ok(path) = std::env::var(LOG_FILE_ENV) {
            config.log_file = Some(PathBuf::from(path));
        }
        config
    }
}

/// Initialize logging from the environment, ignoring failures
///
/// Idempotent: only the first call installs a subscriber.
pub fn init_logging_default() {
    let _ = init_logging_from_env();
}

/// Initialize logging from `RUST_LOG` and the `PAGEFORGE_LOG_*` variables
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_with_config(&LoggingConfig::from_env())
}

/// Initialize logging with a custom configuration
///
/// Idempotent: once a subscriber is installed, later calls return `Ok(())`
/// without changing it. A failed installation leaves logging uninitialized,
/// so a later call may try again.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    init_once(&TRACING_INITIALIZED, || install_subscriber(config))
}

/// Run `install` unless `guard` is already set; set it only on success
fn init_once<F>(guard: &OnceCell<()>, install: F) -> Result<(), LoggingError>
where
    F: FnOnce() -> Result<(), LoggingError>,
{
    guard.get_or_try_init(install).map(|_| ())
}

pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}

fn install_subscriber(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(config.level)?;

    let human = (config.format == LogFormat::Human).then(|| {
        fmt::layer()
            .with_target(true)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
    });
    let json = (config.format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(false)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
    });
    let file = match &config.log_file {
        Some(path) => Some(
            fmt::layer()
                .json()
                .with_writer(Mutex::new(open_log_file(path)?))
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(human)
        .with(json)
        .with(file)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInit(e.to_string()))
}

fn open_log_file(path: &Path) -> Result<std::fs::File, LoggingError> {
    let fail = |e: std::io::Error| LoggingError::FileOpenFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(fail)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(fail)
}

/// `RUST_LOG` wins over the configured level
fn build_env_filter(level: LogLevel) -> Result<EnvFilter, LoggingError> {
    match std::env::var("RUST_LOG") {
        Ok(rust_log) => {
            EnvFilter::try_new(rust_log).map_err(|e| LoggingError::InvalidLogLevel(e.to_string()))
        }
        Err(_) => Ok(EnvFilter::new(level.as_filter_str())),
    }
}
