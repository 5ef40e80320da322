//! Root registry: which storage manager owns which account root
//!
//! The registry is rebuilt wholesale from the account source, never patched
//! incrementally. A rebuild publishes a new immutable snapshot; requests that
//! captured the previous snapshot keep using it until they finish.

use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use crate::core::{
    AccountSource, DocumentId, Root, StorageManager, StorageProvider, ROOT_PATH,
};

/// One registered account: its root id and its storage manager
#[derive(Clone)]
pub struct RegistryEntry {
    pub root_id: DocumentId,
    pub storage: Arc<dyn StorageManager>,
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("root_id", &self.root_id)
            .field("account", &self.storage.account().name)
            .finish()
    }
}

/// Immutable mapping of root id to storage manager, in account order
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    entries: Vec<RegistryEntry>,
}

impl RegistrySnapshot {
    /// Storage manager registered under `root_id`
    pub fn get(&self, root_id: DocumentId) -> Option<&Arc<dyn StorageManager>> {
        self.entries
            .iter()
            .find(|entry| entry.root_id == root_id)
            .map(|entry| &entry.storage)
    }

    pub fn contains_root(&self, root_id: DocumentId) -> bool {
        self.get(root_id).is_some()
    }

    /// Registered managers in account-enumeration order
    pub fn managers(&self) -> impl Iterator<Item = &Arc<dyn StorageManager>> {
        self.entries.iter().map(|entry| &entry.storage)
    }

    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds and publishes registry snapshots
pub struct RootRegistry {
    accounts: Arc<dyn AccountSource>,
    storage: Arc<dyn StorageProvider>,
    current: RwLock<Option<Arc<RegistrySnapshot>>>,
}

impl RootRegistry {
    pub fn new(accounts: Arc<dyn AccountSource>, storage: Arc<dyn StorageProvider>) -> Self {
        Self {
            accounts,
            storage,
            current: RwLock::new(None),
        }
    }

    /// Rebuild the mapping from the current account set
    ///
    /// Obtains one storage manager per account and registers the id of its
    /// `/` record. Accounts whose manager has no root record are skipped.
    /// Returns the new snapshot and the roots in account-enumeration order.
    pub fn rebuild(&self) -> (Arc<RegistrySnapshot>, Vec<Root>) {
        let mut entries = Vec::new();
        let mut roots = Vec::new();

        for account in self.accounts.list_accounts() {
            let storage = self.storage.storage_for(&account);
            let Some(root_dir) = storage.file_by_path(ROOT_PATH) else {
                warn!("Account {} has no root folder indexed, skipping", account);
                continue;
            };

            debug!("Registering root {} for account {}", root_dir.id, account);
            roots.push(Root::for_account(&account, &root_dir));
            entries.push(RegistryEntry {
                root_id: root_dir.id,
                storage,
            });
        }

        let snapshot = Arc::new(RegistrySnapshot { entries });
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        (snapshot, roots)
    }

    /// The last published snapshot, building one if none exists yet
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let existing = self
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match existing {
            Some(snapshot) => snapshot,
            None => self.rebuild().0,
        }
    }
}
