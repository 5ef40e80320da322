//! In-memory storage manager
//!
//! Keeps one account's file index in memory. Cloning a manager yields a new
//! handle over the same index, which is how hosts hand out a fresh manager
//! per root listing while the index itself outlives every handle.

use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::core::errors::{StorageError, StorageResult};
use crate::core::storage_manager::{NewFileEntry, StorageManager};
use crate::core::types::{
    join_remote_path, Account, DocumentId, RemoteFile, DIRECTORY_MIME_TYPE, ROOT_PATH,
};

/// Hands out document ids
///
/// Sharing one allocator between several managers keeps ids unique across
/// those accounts; giving each manager its own allocator does not.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn allocate(&self) -> DocumentId {
        DocumentId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
struct FileIndex {
    files: HashMap<DocumentId, RemoteFile>,
    by_path: HashMap<String, DocumentId>,
    by_local: HashMap<PathBuf, DocumentId>,
    /// Folder id -> child name -> child id, kept sorted by name
    children: HashMap<DocumentId, BTreeMap<String, DocumentId>>,
}

impl FileIndex {
    fn insert(&mut self, file: RemoteFile) {
        if let Some(parent) = file.parent_id {
            self.children
                .entry(parent)
                .or_default()
                .insert(file.name().to_string(), file.id);
        }
        if let Some(local) = &file.local_path {
            self.by_local.insert(local.clone(), file.id);
        }
        self.by_path.insert(file.remote_path.clone(), file.id);
        self.files.insert(file.id, file);
    }
}

/// Storage manager backed by an in-memory index
#[derive(Debug, Clone)]
pub struct MemoryStorageManager {
    account: Account,
    index: Arc<RwLock<FileIndex>>,
    ids: Arc<IdAllocator>,
}

impl MemoryStorageManager {
    /// Create a manager holding only the account root, with its own id space
    pub fn new(account: Account) -> Self {
        Self::with_allocator(account, Arc::new(IdAllocator::new()))
    }

    /// Create a manager that draws ids from a shared allocator
    pub fn with_allocator(account: Account, ids: Arc<IdAllocator>) -> Self {
        let mut index = FileIndex::default();
        index.insert(RemoteFile {
            id: ids.allocate(),
            parent_id: None,
            remote_path: ROOT_PATH.to_string(),
            local_path: None,
            is_folder: true,
            is_downloaded: false,
            size: 0,
            mime_type: DIRECTORY_MIME_TYPE.to_string(),
            last_modified: Some(Utc::now()),
        });

        Self {
            account,
            index: Arc::new(RwLock::new(index)),
            ids,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FileIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FileIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The account root record
    pub fn root(&self) -> StorageResult<RemoteFile> {
        self.file_by_path(ROOT_PATH).ok_or_else(|| StorageError::NotAFolder {
            path: ROOT_PATH.to_string(),
        })
    }

    /// Number of indexed records, root included
    pub fn len(&self) -> usize {
        self.read().files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().files.is_empty()
    }

    /// Index a remote folder under `parent_path`
    pub fn insert_folder(&self, parent_path: &str, name: &str) -> StorageResult<RemoteFile> {
        self.insert_entry(parent_path, name, true, 0, DIRECTORY_MIME_TYPE)
    }

    /// Index a remote file under `parent_path`; it starts out not downloaded
    pub fn insert_file(
        &self,
        parent_path: &str,
        name: &str,
        size: u64,
        mime_type: &str,
    ) -> StorageResult<RemoteFile> {
        self.insert_entry(parent_path, name, false, size, mime_type)
    }

    fn insert_entry(
        &self,
        parent_path: &str,
        name: &str,
        is_folder: bool,
        size: u64,
        mime_type: &str,
    ) -> StorageResult<RemoteFile> {
        let mut index = self.write();
        let parent = index
            .by_path
            .get(parent_path)
            .and_then(|id| index.files.get(id))
            .cloned()
            .ok_or_else(|| StorageError::NotAFolder {
                path: parent_path.to_string(),
            })?;
        if !parent.is_folder {
            return Err(StorageError::NotAFolder {
                path: parent.remote_path,
            });
        }

        let remote_path = join_remote_path(&parent.remote_path, name);
        if index.by_path.contains_key(&remote_path) {
            return Err(StorageError::DuplicatePath { path: remote_path });
        }

        let file = RemoteFile {
            id: self.ids.allocate(),
            parent_id: Some(parent.id),
            remote_path,
            local_path: None,
            is_folder,
            is_downloaded: false,
            size,
            mime_type: mime_type.to_string(),
            last_modified: Some(Utc::now()),
        };
        index.insert(file.clone());
        Ok(file)
    }

    /// Download completion: the record now has a local copy
    pub fn mark_downloaded(&self, id: DocumentId, local_path: PathBuf) -> StorageResult<RemoteFile> {
        let mut index = self.write();
        let previous_local = {
            let file = index
                .files
                .get_mut(&id)
                .ok_or(StorageError::UnknownFile { id: id.value() })?;
            file.is_downloaded = true;
            file.local_path.replace(local_path.clone())
        };
        if let Some(previous) = previous_local {
            index.by_local.remove(&previous);
        }
        index.by_local.insert(local_path, id);
        Ok(index.files[&id].clone())
    }

    /// Upload completion with a delete-local policy: the local copy is gone
    pub fn mark_evicted(&self, id: DocumentId) -> StorageResult<RemoteFile> {
        let mut index = self.write();
        let previous_local = {
            let file = index
                .files
                .get_mut(&id)
                .ok_or(StorageError::UnknownFile { id: id.value() })?;
            if file.is_folder {
                return Ok(file.clone());
            }
            file.is_downloaded = false;
            file.local_path.take()
        };
        if let Some(previous) = previous_local {
            index.by_local.remove(&previous);
        }
        Ok(index.files[&id].clone())
    }

    /// Upload completion: refresh size and modification time
    pub fn update_metadata(&self, id: DocumentId, size: u64) -> StorageResult<RemoteFile> {
        let mut index = self.write();
        let file = index
            .files
            .get_mut(&id)
            .ok_or(StorageError::UnknownFile { id: id.value() })?;
        file.size = size;
        file.last_modified = Some(Utc::now());
        Ok(file.clone())
    }
}

impl StorageManager for MemoryStorageManager {
    fn account(&self) -> &Account {
        &self.account
    }

    fn file_by_id(&self, id: DocumentId) -> Option<RemoteFile> {
        self.read().files.get(&id).cloned()
    }

    fn file_by_path(&self, remote_path: &str) -> Option<RemoteFile> {
        let index = self.read();
        index
            .by_path
            .get(remote_path)
            .and_then(|id| index.files.get(id))
            .cloned()
    }

    fn file_by_local_path(&self, local_path: &Path) -> Option<RemoteFile> {
        let index = self.read();
        index
            .by_local
            .get(local_path)
            .and_then(|id| index.files.get(id))
            .cloned()
    }

    fn folder_content(
        &self,
        folder: &RemoteFile,
        include_hidden: bool,
    ) -> StorageResult<Vec<RemoteFile>> {
        let index = self.read();
        let current = index
            .files
            .get(&folder.id)
            .ok_or(StorageError::UnknownParent {
                id: folder.id.value(),
            })?;
        if !current.is_folder {
            return Err(StorageError::NotAFolder {
                path: current.remote_path.clone(),
            });
        }

        let children = match index.children.get(&folder.id) {
            Some(children) => children,
            None => return Ok(Vec::new()),
        };

        Ok(children
            .values()
            .filter_map(|id| index.files.get(id))
            .filter(|file| include_hidden || !file.is_hidden())
            .cloned()
            .collect())
    }

    fn index_new_file(&self, entry: NewFileEntry) -> StorageResult<RemoteFile> {
        let mut index = self.write();
        let parent = index
            .files
            .get(&entry.parent_id)
            .cloned()
            .ok_or(StorageError::UnknownParent {
                id: entry.parent_id.value(),
            })?;
        if !parent.is_folder {
            return Err(StorageError::NotAFolder {
                path: parent.remote_path,
            });
        }
        if index.by_path.contains_key(&entry.remote_path) {
            return Err(StorageError::DuplicatePath {
                path: entry.remote_path,
            });
        }

        let size = std::fs::metadata(&entry.local_path)
            .map(|meta| meta.len())
            .unwrap_or(0);
        let file = RemoteFile {
            id: self.ids.allocate(),
            parent_id: Some(parent.id),
            remote_path: entry.remote_path,
            local_path: Some(entry.local_path),
            is_folder: false,
            is_downloaded: true,
            size,
            mime_type: entry.mime_type,
            last_modified: Some(Utc::now()),
        };
        index.insert(file.clone());
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn manager() -> MemoryStorageManager {
        let manager = MemoryStorageManager::new(Account::new("alice@example.com"));
        manager.insert_folder("/", "Documents").unwrap();
        manager
            .insert_file("/Documents", "report.pdf", 2048, "application/pdf")
            .unwrap();
        manager
            .insert_file("/Documents", ".secret", 1, "text/plain")
            .unwrap();
        manager.insert_file("/", "a.txt", 3, "text/plain").unwrap();
        manager
    }

    #[test]
    fn test_root_is_indexed() {
        let manager = MemoryStorageManager::new(Account::new("alice@example.com"));
        let root = manager.root().unwrap();
        assert!(root.is_root());
        assert!(root.is_folder);
        assert_eq!(manager.file_by_id(root.id), Some(root));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_lookup_by_path_and_id() {
        let manager = manager();
        let report = manager.file_by_path("/Documents/report.pdf").unwrap();
        assert_eq!(report.name(), "report.pdf");
        assert_eq!(report.size, 2048);
        assert!(!report.is_downloaded);
        assert_eq!(manager.file_by_id(report.id).unwrap().remote_path, "/Documents/report.pdf");
        assert!(manager.file_by_path("/missing").is_none());
    }

    #[test]
    fn test_folder_content_sorted_and_hidden_filtered() {
        let manager = manager();
        let root = manager.root().unwrap();

        let names: Vec<_> = manager
            .folder_content(&root, false)
            .unwrap()
            .into_iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["Documents", "a.txt"]);

        let docs = manager.file_by_path("/Documents").unwrap();
        assert_eq!(manager.folder_content(&docs, false).unwrap().len(), 1);
        assert_eq!(manager.folder_content(&docs, true).unwrap().len(), 2);
    }

    #[test]
    fn test_folder_content_of_file_fails() {
        let manager = manager();
        let file = manager.file_by_path("/a.txt").unwrap();
        assert_matches!(
            manager.folder_content(&file, false),
            Err(StorageError::NotAFolder { .. })
        );
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let manager = manager();
        assert_matches!(
            manager.insert_file("/", "a.txt", 1, "text/plain"),
            Err(StorageError::DuplicatePath { .. })
        );
    }

    #[test]
    fn test_download_and_eviction() {
        let manager = manager();
        let file = manager.file_by_path("/a.txt").unwrap();
        let local = PathBuf::from("/cache/alice/a.txt");

        let downloaded = manager.mark_downloaded(file.id, local.clone()).unwrap();
        assert!(downloaded.is_downloaded);
        assert_eq!(manager.file_by_local_path(&local).unwrap().id, file.id);

        let evicted = manager.mark_evicted(file.id).unwrap();
        assert!(!evicted.is_downloaded);
        assert!(evicted.local_path.is_none());
        assert!(manager.file_by_local_path(&local).is_none());
    }

    #[test]
    fn test_clones_share_the_index() {
        let manager = manager();
        let handle = manager.clone();
        handle.insert_file("/", "b.txt", 1, "text/plain").unwrap();
        assert!(manager.file_by_path("/b.txt").is_some());
    }

    #[test]
    fn test_shared_allocator_gives_distinct_ids() {
        let ids = Arc::new(IdAllocator::new());
        let a = MemoryStorageManager::with_allocator(Account::new("a@x"), Arc::clone(&ids));
        let b = MemoryStorageManager::with_allocator(Account::new("b@x"), ids);
        assert_ne!(a.root().unwrap().id, b.root().unwrap().id);

        let c = MemoryStorageManager::new(Account::new("c@x"));
        let d = MemoryStorageManager::new(Account::new("d@x"));
        assert_eq!(c.root().unwrap().id, d.root().unwrap().id);
    }

    #[test]
    fn test_index_new_file() {
        let temp = tempfile::tempdir().unwrap();
        let local = temp.path().join("new.txt");
        std::fs::write(&local, b"hello").unwrap();

        let manager = manager();
        let docs = manager.file_by_path("/Documents").unwrap();
        let file = manager
            .index_new_file(NewFileEntry {
                parent_id: docs.id,
                local_path: local.clone(),
                remote_path: "/Documents/new.txt".to_string(),
                mime_type: "text/plain".to_string(),
            })
            .unwrap();

        assert!(file.is_downloaded);
        assert_eq!(file.size, 5);
        assert_eq!(file.parent_id, Some(docs.id));
        assert_eq!(manager.file_by_local_path(&local).unwrap().id, file.id);
        assert_eq!(manager.folder_content(&docs, true).unwrap().len(), 3);
    }
}
