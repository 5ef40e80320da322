//! Error types for the DocBridge backend daemon
//!
//! This module layers the daemon's own failure modes (configuration, IPC,
//! transfers) on top of the bridge errors from the shared crate.

use std::fmt;
use thiserror::Error;

use docbridge_shared::BridgeError;

/// Main error type for the DocBridge backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document bridge errors
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// IPC communication errors
    #[error("IPC error: {0}")]
    Ipc(#[from] IpcError),

    /// Download and upload failures
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// File system operation errors
    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    /// Internal daemon errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// Anyhow errors (for context and chaining)
    #[error("Operation failed: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },

    #[error("Invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("Configuration parsing failed: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("YAML configuration parsing failed: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration serialization failed: {reason}")]
    Serialize { reason: String },

    #[error("Unknown account: {name}")]
    UnknownAccount { name: String },
}

/// IPC communication errors
#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Failed to bind to socket: {path}")]
    SocketBind { path: String },

    #[error("Invalid request format: {reason}")]
    InvalidRequest { reason: String },

    #[error("Response serialization failed: {reason}")]
    ResponseSerialization { reason: String },

    #[error("Socket permissions error: {reason}")]
    SocketPermissions { reason: String },

    #[error("Unknown content handle: {handle_id}")]
    UnknownHandle { handle_id: String },

    #[error("Request {request_id} is already pending on this connection")]
    DuplicateRequest { request_id: String },

    #[error("Maximum concurrent connections reached")]
    TooManyConnections,
}

/// Download and upload failures
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("No storage for account {account}")]
    UnknownAccount { account: String },

    #[error("Document {id} vanished before its transfer ran")]
    UnknownDocument { id: String },

    #[error("Copying {from} to {to} failed: {reason}")]
    Copy {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Transfer queue is closed")]
    QueueClosed,
}

/// Result type alias for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Trait for converting errors to user-friendly messages
pub trait UserFriendlyError {
    /// Convert the error to a message safe to show to users
    /// (without exposing internal implementation details)
    fn user_message(&self) -> String;

    /// Get the error category for metrics/logging
    fn category(&self) -> ErrorCategory;
}

/// Error categories for metrics and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    NotFound,
    Storage,
    Transfer,
    Network,
    Validation,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Configuration => write!(f, "configuration"),
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Transfer => write!(f, "transfer"),
            ErrorCategory::Network => write!(f, "network"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Internal => write!(f, "internal"),
        }
    }
}

impl UserFriendlyError for BackendError {
    fn user_message(&self) -> String {
        match self {
            BackendError::Config(_) => {
                "Configuration error. Please check your settings.".to_string()
            }
            BackendError::Bridge(e) if e.is_not_found() => {
                "The requested document was not found.".to_string()
            }
            BackendError::Bridge(BridgeError::CreationFailed { .. }) => {
                "The document could not be created.".to_string()
            }
            BackendError::Bridge(BridgeError::InvalidMode { mode }) => {
                format!("Unsupported access mode '{}'.", mode)
            }
            BackendError::Bridge(_) => "Document operation failed. Please try again.".to_string(),
            BackendError::Transfer(_) => {
                "File transfer failed. Please check your connection.".to_string()
            }
            BackendError::Ipc(IpcError::UnknownHandle { .. }) => {
                "The document is no longer open.".to_string()
            }
            BackendError::Ipc(IpcError::DuplicateRequest { request_id }) => {
                format!("Request id '{}' is already in use.", request_id)
            }
            BackendError::Ipc(_) => {
                "Communication error. Please restart the application.".to_string()
            }
            _ => "An unexpected error occurred. Please try again.".to_string(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            BackendError::Config(_) => ErrorCategory::Configuration,
            BackendError::Bridge(e) if e.is_not_found() => ErrorCategory::NotFound,
            BackendError::Bridge(BridgeError::InvalidMode { .. }) => ErrorCategory::Validation,
            BackendError::Bridge(_) => ErrorCategory::Storage,
            BackendError::Transfer(_) => ErrorCategory::Transfer,
            BackendError::Ipc(IpcError::UnknownHandle { .. }) => ErrorCategory::NotFound,
            BackendError::Ipc(IpcError::DuplicateRequest { .. }) => ErrorCategory::Validation,
            BackendError::Ipc(_) => ErrorCategory::Network,
            _ => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BackendError::Bridge(BridgeError::not_found(42));
        assert!(error.to_string().contains("42"));
    }

    #[test]
    fn test_user_friendly_message() {
        let error = BackendError::Bridge(BridgeError::MalformedId {
            id: "abc".to_string(),
        });
        let message = error.user_message();
        assert!(!message.contains("abc"));
        assert!(message.contains("not found"));
    }

    #[test]
    fn test_error_category() {
        let error = BackendError::Bridge(BridgeError::creation("disk full"));
        assert_eq!(error.category(), ErrorCategory::Storage);

        let error = BackendError::Transfer(TransferError::QueueClosed);
        assert_eq!(error.category(), ErrorCategory::Transfer);
        assert_eq!(error.category().to_string(), "transfer");

        let error = BackendError::Ipc(IpcError::DuplicateRequest {
            request_id: "open-1".to_string(),
        });
        assert_eq!(error.category(), ErrorCategory::Validation);
        assert!(error.user_message().contains("open-1"));
    }

    #[test]
    fn test_error_chaining() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let backend_error = BackendError::FileSystem(io_error);

        assert!(backend_error.to_string().contains("File system error"));
    }
}
