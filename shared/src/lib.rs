//! DocBridge Shared Library
//!
//! This crate presents several account-scoped remote file trees as one
//! hierarchical document API. Each account contributes a root; documents are
//! addressed by numeric ids, resolved to the account that owns them, and
//! materialized into a local cache on first access.
//!
//! # Features
//!
//! - **Root Registry**: One root per account, rebuilt from the account source
//! - **Resolution**: Per-request mapping of document ids to storage managers
//! - **Content Access**: Download on open, upload on close
//! - **Creation**: Local placeholders indexed and queued for upload
//! - **Search**: Recursive, case-sensitive file-name search
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use docbridge_shared::{
//!     Account, BridgeConfig, DocumentsBridge, MemoryStorageManager, RecordingTransfer,
//!     StaticAccountSource, StorageManager, StorageProvider,
//! };
//!
//! struct Provider(MemoryStorageManager);
//!
//! impl StorageProvider for Provider {
//!     fn storage_for(&self, _account: &Account) -> Arc<dyn StorageManager> {
//!         Arc::new(self.0.clone())
//!     }
//! }
//!
//! let account = Account::new("alice@cloud.example.com");
//! let storage = MemoryStorageManager::new(account.clone());
//! storage.insert_file("/", "notes.txt", 12, "text/plain").unwrap();
//!
//! let bridge = DocumentsBridge::new(
//!     Arc::new(StaticAccountSource::new(vec![account])),
//!     Arc::new(Provider(storage)),
//!     Arc::new(RecordingTransfer::new()),
//!     BridgeConfig::default(),
//! )
//! .unwrap();
//!
//! let roots = bridge.list_roots();
//! assert_eq!(roots[0].title, "alice");
//! ```

pub mod bridge;
pub mod config;
pub mod core;
pub mod logging;

// Re-export commonly used types for convenience
pub use bridge::{
    ContentAccessor, ContentHandle, DocumentCreator, DocumentsBridge, DownloadOutcome,
    DownloadWaiter, RequestContext, RootRegistry, SearchEngine, ThumbnailHandle,
};

pub use config::{BridgeConfig, DEFAULT_POLL_INTERVAL_MS};

pub use crate::core::{
    join_remote_path, AccessMode, Account, AccountSource, BridgeError, BridgeResult, ContentAccess,
    DocumentFlags, DocumentId, ErrorCategory, IdAllocator, MemoryStorageManager, NewFileEntry,
    RecordingTransfer, RemoteFile, Root, RootFlags, SizeHint, StaticAccountSource, StorageError,
    StorageManager, StorageProvider, StorageResult, TransferJob, TransferSubsystem, UploadRequest,
    DIRECTORY_MIME_TYPE, ROOT_PATH,
};

pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
