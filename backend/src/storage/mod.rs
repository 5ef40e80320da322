//! Storage module for DocBridge backend
//!
//! Each configured account is backed by a directory that stands in for its
//! server. At startup the directory tree is scanned into an in-memory
//! storage manager; downloaded copies live under the cache directory, one
//! subdirectory per account.
//!
//! All managers share a single id allocator, so document ids are unique
//! across accounts served by this daemon.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::config::{AccountConfig, Config};
use crate::error::{BackendResult, TransferError};
use docbridge_shared::{
    Account, AccountSource, BridgeResult, IdAllocator, MemoryStorageManager, StorageManager,
    StorageProvider, ROOT_PATH,
};

/// Directory-backed storage for every configured account
#[derive(Debug)]
pub struct AccountStores {
    accounts: Vec<AccountConfig>,
    cache_dir: PathBuf,
    ids: Arc<IdAllocator>,
    managers: RwLock<HashMap<String, MemoryStorageManager>>,
}

impl AccountStores {
    /// Scan every account's remote directory
    pub fn open(config: &Config) -> BackendResult<Self> {
        fs::create_dir_all(&config.storage.cache_dir)?;

        let stores = Self {
            accounts: config.accounts.clone(),
            cache_dir: config.storage.cache_dir.clone(),
            ids: Arc::new(IdAllocator::new()),
            managers: RwLock::new(HashMap::new()),
        };
        for account in &stores.accounts {
            let manager = stores.scan_account(account);
            info!(
                "Indexed {} entries for account {}",
                manager.len(),
                account.name
            );
            stores.write().insert(account.name.clone(), manager);
        }
        Ok(stores)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, MemoryStorageManager>> {
        self.managers.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn scan_account(&self, account: &AccountConfig) -> MemoryStorageManager {
        let manager = MemoryStorageManager::with_allocator(account.account(), Arc::clone(&self.ids));
        if !account.remote_dir.is_dir() {
            warn!(
                "Remote directory {:?} for {} is missing, serving an empty tree",
                account.remote_dir, account.name
            );
            return manager;
        }
        if let Err(e) = scan_dir(&manager, &account.remote_dir, ROOT_PATH) {
            warn!("Scan of {:?} stopped early: {}", account.remote_dir, e);
        }
        manager
    }

    /// The storage manager of `name`, if the account is configured
    pub fn manager(&self, name: &str) -> Option<MemoryStorageManager> {
        self.managers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub(crate) fn require_manager(&self, name: &str) -> Result<MemoryStorageManager, TransferError> {
        self.manager(name).ok_or_else(|| TransferError::UnknownAccount {
            account: name.to_string(),
        })
    }

    /// Directory serving as the server side of `name`
    pub fn remote_dir(&self, name: &str) -> Result<&Path, TransferError> {
        self.accounts
            .iter()
            .find(|account| account.name == name)
            .map(|account| account.remote_dir.as_path())
            .ok_or_else(|| TransferError::UnknownAccount {
                account: name.to_string(),
            })
    }

    /// Server-side location of `remote_path`
    pub fn remote_location(&self, name: &str, remote_path: &str) -> Result<PathBuf, TransferError> {
        Ok(self.remote_dir(name)?.join(relative(remote_path)))
    }

    /// Cache location of `remote_path`
    pub fn cache_location(&self, name: &str, remote_path: &str) -> PathBuf {
        self.cache_dir.join(name).join(relative(remote_path))
    }
}

impl AccountSource for AccountStores {
    fn list_accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(AccountConfig::account).collect()
    }
}

impl StorageProvider for AccountStores {
    fn storage_for(&self, account: &Account) -> Arc<dyn StorageManager> {
        if let Some(manager) = self.manager(&account.name) {
            return Arc::new(manager);
        }
        warn!("No storage configured for {}, creating an empty one", account);
        let manager = self
            .write()
            .entry(account.name.clone())
            .or_insert_with(|| {
                MemoryStorageManager::with_allocator(account.clone(), Arc::clone(&self.ids))
            })
            .clone();
        Arc::new(manager)
    }
}

fn relative(remote_path: &str) -> &str {
    remote_path.trim_start_matches('/')
}

/// Index the contents of `dir` below `remote_parent`, depth first
fn scan_dir(manager: &MemoryStorageManager, dir: &Path, remote_parent: &str) -> BridgeResult<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            let folder = manager.insert_folder(remote_parent, &name)?;
            scan_dir(manager, &entry.path(), &folder.remote_path)?;
        } else if file_type.is_file() {
            let size = entry.metadata()?.len();
            manager.insert_file(remote_parent, &name, size, guess_mime_type(&name))?;
        } else {
            debug!("Skipping special file {:?}", entry.path());
        }
    }
    Ok(())
}

/// Mime type from a file name's extension
pub fn guess_mime_type(name: &str) -> &'static str {
    let extension = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return "application/octet-stream",
    };
    match extension.as_str() {
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "yml" | "yaml" => "application/yaml",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "odt" => "application/vnd.oasis.opendocument.text",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "application/octet-stream",
    }
}
