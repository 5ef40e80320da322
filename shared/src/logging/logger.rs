//! Logging configuration and utilities for DocBridge

use regex::Regex;
use std::sync::{Once, OnceLock};
use tracing_subscriber::EnvFilter;

/// One-time initialization flag for logging
static INIT: Once = Once::new();

/// Logging configuration structure
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
        }
    }
}

/// Log levels supported by the logging system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse log level from string
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }
}

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Level and message only
    Compact,
    /// Timestamp, level, target, thread ids
    Full,
    /// One JSON object per event
    Json,
}

/// Initialize logging with the given configuration
///
/// Only the first call has an effect. `RUST_LOG` overrides the configured
/// level when set. Installing the subscriber fails quietly if the host
/// already installed one.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
        let builder = tracing_subscriber::fmt().with_env_filter(filter);

        let result = match config.format {
            LogFormat::Compact => builder.compact().with_target(false).try_init(),
            LogFormat::Full => builder.with_thread_ids(true).try_init(),
            LogFormat::Json => builder.json().try_init(),
        };
        if result.is_err() {
            tracing::debug!("Global subscriber already installed, keeping it");
        }
    });
}

fn credential_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"://[^/\s:@]+:[^/\s@]+@", "://***:***@"),
            (r"(?i)password[=:\s]+[^\s&]+", "password=***"),
            (r"(?i)token[=:\s]+[^\s&]+", "token=***"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Redact credentials embedded in server URLs and query strings
pub fn sanitize_log_message(message: &str) -> String {
    credential_patterns()
        .iter()
        .fold(message.to_string(), |acc, (re, replacement)| {
            re.replace_all(&acc, *replacement).into_owned()
        })
}
