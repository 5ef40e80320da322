//! Core error types for the document tree bridge.
//!
//! Resolution failures, creation failures and storage-layer failures are
//! kept as separate enums so the storage manager implementations never have
//! to know about the bridge operations built on top of them.

use std::fmt;
use thiserror::Error;

/// Errors raised by bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No registered storage manager knows the document
    #[error("Document not found: {id}")]
    DocumentNotFound { id: String },

    /// The id is not the root of any registered account
    #[error("Root not found: {id}")]
    RootNotFound { id: String },

    /// The id string is not a numeric document id
    #[error("Malformed document id: '{id}'")]
    MalformedId { id: String },

    /// The document has no local copy to serve from
    #[error("Document has no local copy: {id}")]
    NotMaterialized { id: String },

    /// The host passed an access mode we do not understand
    #[error("Unsupported access mode: '{mode}'")]
    InvalidMode { mode: String },

    /// A configuration value is out of range
    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Placeholder creation or re-resolution failed
    #[error("Document creation failed: {reason}")]
    CreationFailed { reason: String },

    /// The owning storage manager rejected the operation
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Local cache I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by storage manager implementations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Parent folder not indexed: {id}")]
    UnknownParent { id: u64 },

    #[error("File not indexed: {id}")]
    UnknownFile { id: u64 },

    #[error("Not a folder: {path}")]
    NotAFolder { path: String },

    #[error("Path already indexed: {path}")]
    DuplicatePath { path: String },

    #[error("Storage I/O error: {message}")]
    Io { message: String },
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Result type for storage manager operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Error categories used by hosts to map failures onto their own codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    NotFound,
    CreationFailure,
    Storage,
    Validation,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::NotFound => write!(f, "not_found"),
            ErrorCategory::CreationFailure => write!(f, "creation_failure"),
            ErrorCategory::Storage => write!(f, "storage"),
            ErrorCategory::Validation => write!(f, "validation"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

impl BridgeError {
    /// Shorthand for an unresolvable document id
    pub fn not_found(id: impl ToString) -> Self {
        BridgeError::DocumentNotFound { id: id.to_string() }
    }

    /// Shorthand for a creation failure
    pub fn creation(reason: impl Into<String>) -> Self {
        BridgeError::CreationFailed {
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::DocumentNotFound { .. }
            | BridgeError::RootNotFound { .. }
            | BridgeError::MalformedId { .. }
            | BridgeError::NotMaterialized { .. } => ErrorCategory::NotFound,
            BridgeError::InvalidMode { .. } | BridgeError::InvalidConfig { .. } => {
                ErrorCategory::Validation
            }
            BridgeError::CreationFailed { .. } => ErrorCategory::CreationFailure,
            BridgeError::Storage(_) => ErrorCategory::Storage,
            BridgeError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Whether the host should report this as a missing document
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io {
            message: err.to_string(),
        }
    }
}
