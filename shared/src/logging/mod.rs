//! Logging infrastructure for DocBridge
//!
//! The bridge logs through `tracing` macros everywhere. Hosts that do not
//! install their own subscriber can call one of the initializers here.

pub mod logger;

pub use logger::{init_logging, sanitize_log_message, LogFormat, LogLevel, LoggingConfig};

/// Initialize logging with default configuration
pub fn init_default_logging() {
    init_logging(LoggingConfig::default());
}
