//! Simulated accounts and transfers for bridge tests
//!
//! A [`SimulatedTransfer`] completes a download after a fixed number of
//! completion checks. Checks are counted by [`PollingStorage`], which wraps
//! the in-memory storage manager handed to the bridge.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::bridge::DocumentsBridge;
use crate::config::BridgeConfig;
use crate::core::{
    Account, AccountSource, DocumentId, IdAllocator, MemoryStorageManager, RecordingTransfer,
    RemoteFile, StaticAccountSource, StorageManager, StorageProvider, StorageResult,
    TransferSubsystem, UploadRequest,
};

/// Transfer double whose downloads finish after `polls_needed` checks
pub struct SimulatedTransfer {
    recorded: RecordingTransfer,
    polls_needed: u32,
    pending: Mutex<HashMap<(String, DocumentId), u32>>,
    observed: Mutex<HashMap<DocumentId, u32>>,
    cancel_at: Mutex<Option<(u32, CancellationToken)>>,
}

impl SimulatedTransfer {
    pub fn new(polls_needed: u32) -> Self {
        Self {
            recorded: RecordingTransfer::new(),
            polls_needed,
            pending: Mutex::new(HashMap::new()),
            observed: Mutex::new(HashMap::new()),
            cancel_at: Mutex::new(None),
        }
    }

    /// Cancel `token` as soon as the `polls`-th completion check is made
    pub fn cancel_after(&self, polls: u32, token: CancellationToken) {
        *self.cancel_at.lock().unwrap() = Some((polls, token));
    }

    pub fn recorded(&self) -> &RecordingTransfer {
        &self.recorded
    }

    /// Completion checks made while a download of `id` was pending
    pub fn polls_observed(&self, id: DocumentId) -> u32 {
        self.observed.lock().unwrap().get(&id).copied().unwrap_or(0)
    }

    /// Count one check; true once the download should be reported complete
    fn tick(&self, account: &Account, id: DocumentId) -> bool {
        let mut pending = self.pending.lock().unwrap();
        let key = (account.name.clone(), id);
        let Some(count) = pending.get_mut(&key) else {
            return false;
        };
        *count += 1;
        let mut observed = self.observed.lock().unwrap();
        let seen = observed.entry(id).or_insert(0);
        *seen += 1;
        if let Some((at, token)) = self.cancel_at.lock().unwrap().as_ref() {
            if *seen >= *at {
                token.cancel();
            }
        }
        if *count >= self.polls_needed {
            pending.remove(&key);
            true
        } else {
            false
        }
    }
}

impl TransferSubsystem for SimulatedTransfer {
    fn submit_download(&self, account: &Account, file: &RemoteFile) {
        self.recorded.submit_download(account, file);
        self.pending
            .lock()
            .unwrap()
            .insert((account.name.clone(), file.id), 0);
    }

    fn submit_upload(&self, request: UploadRequest) {
        self.recorded.submit_upload(request);
    }
}

/// Storage manager that lets the simulated transfer observe each lookup
pub struct PollingStorage {
    inner: MemoryStorageManager,
    transfer: Arc<SimulatedTransfer>,
    remote_root: PathBuf,
    cache_root: PathBuf,
}

impl StorageManager for PollingStorage {
    fn account(&self) -> &Account {
        self.inner.account()
    }

    fn file_by_id(&self, id: DocumentId) -> Option<RemoteFile> {
        if self.transfer.tick(self.inner.account(), id) {
            materialize(&self.inner, id, &self.remote_root, &self.cache_root);
        }
        self.inner.file_by_id(id)
    }

    fn file_by_path(&self, remote_path: &str) -> Option<RemoteFile> {
        self.inner.file_by_path(remote_path)
    }

    fn file_by_local_path(&self, local_path: &Path) -> Option<RemoteFile> {
        self.inner.file_by_local_path(local_path)
    }

    fn folder_content(
        &self,
        folder: &RemoteFile,
        include_hidden: bool,
    ) -> StorageResult<Vec<RemoteFile>> {
        self.inner.folder_content(folder, include_hidden)
    }

    fn index_new_file(&self, entry: crate::core::NewFileEntry) -> StorageResult<RemoteFile> {
        self.inner.index_new_file(entry)
    }
}

struct FixtureProvider {
    managers: HashMap<String, MemoryStorageManager>,
    transfer: Arc<SimulatedTransfer>,
    remote_root: PathBuf,
    cache_root: PathBuf,
}

impl StorageProvider for FixtureProvider {
    fn storage_for(&self, account: &Account) -> Arc<dyn StorageManager> {
        Arc::new(PollingStorage {
            inner: self.managers[&account.name].clone(),
            transfer: Arc::clone(&self.transfer),
            remote_root: self.remote_root.clone(),
            cache_root: self.cache_root.clone(),
        })
    }
}

fn local_location(root: &Path, account: &Account, remote_path: &str) -> PathBuf {
    root.join(&account.name)
        .join(remote_path.trim_start_matches('/'))
}

/// Copy a file (or create a folder) into the cache and flag it downloaded
fn materialize(storage: &MemoryStorageManager, id: DocumentId, remote_root: &Path, cache_root: &Path) {
    let file = storage.file_by_id(id).unwrap();
    let local = local_location(cache_root, storage.account(), &file.remote_path);
    if file.is_folder {
        std::fs::create_dir_all(&local).unwrap();
    } else {
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        let remote = local_location(remote_root, storage.account(), &file.remote_path);
        let content = std::fs::read(remote).unwrap_or_default();
        std::fs::write(&local, content).unwrap();
    }
    storage.mark_downloaded(id, local).unwrap();
}

/// A bridge over several in-memory accounts sharing one id space
pub struct Fixture {
    pub bridge: DocumentsBridge,
    pub transfer: Arc<SimulatedTransfer>,
    provider: Arc<FixtureProvider>,
    accounts: Arc<StaticAccountSource>,
    _dir: TempDir,
}

impl Fixture {
    pub fn new(names: &[&str], polls_needed: u32) -> Self {
        let dir = TempDir::new().unwrap();
        let ids = Arc::new(IdAllocator::new());
        let transfer = Arc::new(SimulatedTransfer::new(polls_needed));

        let managers = names
            .iter()
            .map(|name| {
                let storage =
                    MemoryStorageManager::with_allocator(Account::new(*name), Arc::clone(&ids));
                (name.to_string(), storage)
            })
            .collect();
        let provider = Arc::new(FixtureProvider {
            managers,
            transfer: Arc::clone(&transfer),
            remote_root: dir.path().join("remote"),
            cache_root: dir.path().join("cache"),
        });
        let accounts = Arc::new(StaticAccountSource::new(
            names.iter().map(|name| Account::new(*name)).collect(),
        ));

        let config = BridgeConfig::default().with_poll_interval(Duration::from_millis(1));
        let bridge = DocumentsBridge::new(
            accounts.clone(),
            provider.clone(),
            transfer.clone(),
            config,
        )
        .unwrap();

        Self {
            bridge,
            transfer,
            provider,
            accounts,
            _dir: dir,
        }
    }

    /// The in-memory manager behind `name`, sharing its index with the bridge
    pub fn storage(&self, name: &str) -> MemoryStorageManager {
        self.provider.managers[name].clone()
    }

    pub fn accounts(&self) -> Arc<dyn AccountSource> {
        self.accounts.clone()
    }

    pub fn provider(&self) -> Arc<dyn StorageProvider> {
        self.provider.clone()
    }

    /// Place content on the simulated server
    pub fn put_remote(&self, name: &str, remote_path: &str, content: &[u8]) {
        let path = local_location(&self.provider.remote_root, &Account::new(name), remote_path);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// Where the cache copy of `remote_path` lives
    pub fn cache_path(&self, name: &str, remote_path: &str) -> PathBuf {
        local_location(&self.provider.cache_root, &Account::new(name), remote_path)
    }

    /// Download `id` without going through the transfer subsystem
    pub fn materialize(&self, name: &str, id: DocumentId) {
        materialize(
            &self.storage(name),
            id,
            &self.provider.remote_root,
            &self.provider.cache_root,
        );
    }
}
