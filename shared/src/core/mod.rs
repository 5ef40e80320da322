//! Core modules for the document tree bridge
//!
//! This module contains the data model and the collaborator interfaces the
//! bridge consumes:
//! - Remote file records, ids and root descriptors
//! - The per-account storage manager interface and an in-memory implementation
//! - Account enumeration and transfer subsystem interfaces
//! - Error handling and type definitions

pub mod accounts;
pub mod errors;
pub mod memory_storage;
pub mod storage_manager;
pub mod transfer;
pub mod types;

// Re-export commonly used items
pub use accounts::{AccountSource, StaticAccountSource};
pub use errors::{BridgeError, BridgeResult, ErrorCategory, StorageError, StorageResult};
pub use memory_storage::{IdAllocator, MemoryStorageManager};
pub use storage_manager::{NewFileEntry, StorageManager, StorageProvider};
pub use transfer::{RecordingTransfer, TransferJob, TransferSubsystem, UploadRequest};
pub use types::{
    join_remote_path, AccessMode, Account, ContentAccess, DocumentFlags, DocumentId, RemoteFile,
    Root, RootFlags, SizeHint, DIRECTORY_MIME_TYPE, PATH_SEPARATOR, ROOT_PATH,
};
