//! Storage manager interface for the document tree bridge
//!
//! A storage manager owns the complete file index of a single account. The
//! bridge never mutates file records itself; it only looks them up, asks for
//! folder listings, and asks the manager to index placeholders it creates.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::errors::StorageResult;
use crate::core::types::{Account, DocumentId, RemoteFile};

impl std::fmt::Debug for dyn StorageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageManager")
            .field("account", self.account())
            .finish_non_exhaustive()
    }
}

/// Per-account owner of remote file metadata
///
/// Implementations are used polymorphically across accounts: one instance
/// per account, never a subtype per account.
pub trait StorageManager: Send + Sync {
    /// The account this manager belongs to
    fn account(&self) -> &Account;

    /// Look up a record by id
    fn file_by_id(&self, id: DocumentId) -> Option<RemoteFile>;

    /// Look up a record by remote path (`/` is the account root)
    fn file_by_path(&self, remote_path: &str) -> Option<RemoteFile>;

    /// Look up a record by the path of its local cache copy
    fn file_by_local_path(&self, local_path: &Path) -> Option<RemoteFile>;

    /// List the immediate children of a folder
    ///
    /// # Arguments
    /// * `folder` - Folder record to enumerate
    /// * `include_hidden` - Whether dot-files are included
    fn folder_content(
        &self,
        folder: &RemoteFile,
        include_hidden: bool,
    ) -> StorageResult<Vec<RemoteFile>>;

    /// Index a file that was just created in the local cache
    ///
    /// The returned record is immediately visible through `file_by_id`,
    /// `file_by_path` and `file_by_local_path`.
    fn index_new_file(&self, entry: NewFileEntry) -> StorageResult<RemoteFile>;
}

/// Description of a locally created file that a manager should index
#[derive(Debug, Clone, PartialEq)]
pub struct NewFileEntry {
    pub parent_id: DocumentId,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub mime_type: String,
}

/// Obtains (or constructs) the storage manager for an account
pub trait StorageProvider: Send + Sync {
    fn storage_for(&self, account: &Account) -> Arc<dyn StorageManager>;
}
