//! Transfer worker for DocBridge backend
//!
//! The bridge submits jobs synchronously from blocking threads; they are
//! queued on an unbounded channel and executed in order by a single tokio
//! task. Downloads copy a file from the account's remote directory into the
//! cache and flag the record downloaded. Uploads copy the local file back,
//! refresh the record's metadata and, when asked to, drop the local copy.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::TransferError;
use crate::storage::AccountStores;
use docbridge_shared::{
    Account, DocumentId, RemoteFile, StorageManager, TransferSubsystem, UploadRequest,
};

/// A queued transfer
#[derive(Debug, Clone)]
pub enum QueuedTransfer {
    Download { account: Account, file_id: DocumentId },
    Upload(UploadRequest),
}

/// Handle used by the bridge to queue transfers
#[derive(Debug, Clone)]
pub struct TransferService {
    sender: mpsc::UnboundedSender<QueuedTransfer>,
}

impl TransferService {
    /// Start the worker task on the current runtime
    pub fn spawn(stores: Arc<AccountStores>) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = TransferWorker { stores, receiver };
        let handle = tokio::spawn(worker.run());
        (Self { sender }, handle)
    }

    fn enqueue(&self, job: QueuedTransfer) {
        if self.sender.send(job).is_err() {
            error!("{}", TransferError::QueueClosed);
        }
    }
}

impl TransferSubsystem for TransferService {
    fn submit_download(&self, account: &Account, file: &RemoteFile) {
        debug!("Queueing download of {} for {}", file.remote_path, account);
        self.enqueue(QueuedTransfer::Download {
            account: account.clone(),
            file_id: file.id,
        });
    }

    fn submit_upload(&self, request: UploadRequest) {
        debug!(
            "Queueing upload of {:?} to {}",
            request.local_path, request.remote_path
        );
        self.enqueue(QueuedTransfer::Upload(request));
    }
}

struct TransferWorker {
    stores: Arc<AccountStores>,
    receiver: mpsc::UnboundedReceiver<QueuedTransfer>,
}

impl TransferWorker {
    async fn run(mut self) {
        info!("Transfer worker started");
        while let Some(job) = self.receiver.recv().await {
            let result = match &job {
                QueuedTransfer::Download { account, file_id } => {
                    self.download(account, *file_id).await
                }
                QueuedTransfer::Upload(request) => self.upload(request).await,
            };
            if let Err(e) = result {
                error!("Transfer {:?} failed: {}", job, e);
            }
        }
        info!("Transfer worker stopped");
    }

    async fn download(&self, account: &Account, file_id: DocumentId) -> Result<(), TransferError> {
        let storage = self.stores.require_manager(&account.name)?;
        let file = storage
            .file_by_id(file_id)
            .ok_or_else(|| TransferError::UnknownDocument {
                id: file_id.to_string(),
            })?;
        let target = self.stores.cache_location(&account.name, &file.remote_path);

        if file.is_folder {
            tokio::fs::create_dir_all(&target)
                .await
                .map_err(|e| copy_error(Path::new(&file.remote_path), &target, e))?;
        } else {
            let source = self.stores.remote_location(&account.name, &file.remote_path)?;
            copy(&source, &target).await?;
        }

        storage
            .mark_downloaded(file_id, target)
            .map_err(|_| TransferError::UnknownDocument {
                id: file_id.to_string(),
            })?;
        info!("Downloaded {} for {}", file.remote_path, account);
        Ok(())
    }

    async fn upload(&self, request: &UploadRequest) -> Result<(), TransferError> {
        let name = &request.account.name;
        let storage = self.stores.require_manager(name)?;
        let target = self.stores.remote_location(name, &request.remote_path)?;
        let size = copy(&request.local_path, &target).await?;
        info!("Uploaded {} for {}", request.remote_path, request.account);

        let Some(file) = storage.file_by_path(&request.remote_path) else {
            warn!("Uploaded {} is not indexed", request.remote_path);
            return Ok(());
        };
        if let Err(e) = storage.update_metadata(file.id, size) {
            warn!("Could not refresh {}: {}", request.remote_path, e);
        }

        if request.delete_local_after {
            if let Err(e) = tokio::fs::remove_file(&request.local_path).await {
                warn!("Could not remove {:?}: {}", request.local_path, e);
            }
            if let Err(e) = storage.mark_evicted(file.id) {
                warn!("Could not evict {}: {}", request.remote_path, e);
            }
        }
        Ok(())
    }
}

async fn copy(source: &Path, target: &Path) -> Result<u64, TransferError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| copy_error(source, target, e))?;
    }
    tokio::fs::copy(source, target)
        .await
        .map_err(|e| copy_error(source, target, e))
}

fn copy_error(source: &Path, target: &Path, e: std::io::Error) -> TransferError {
    TransferError::Copy {
        from: source.display().to_string(),
        to: target.display().to_string(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AccountConfig, Config};
    use std::time::Duration;
    use tempfile::tempdir;

    fn stores(root: &Path) -> Arc<AccountStores> {
        let remote = root.join("remote");
        std::fs::create_dir_all(remote.join("docs")).unwrap();
        std::fs::write(remote.join("docs").join("a.txt"), b"alpha").unwrap();

        let mut config = Config::default();
        config.storage.cache_dir = root.join("cache");
        config.accounts = vec![AccountConfig {
            name: "alice@x".to_string(),
            remote_dir: remote,
        }];
        Arc::new(AccountStores::open(&config).unwrap())
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_download_materializes_file() {
        let temp_dir = tempdir().unwrap();
        let stores = stores(temp_dir.path());
        let (service, _worker) = TransferService::spawn(Arc::clone(&stores));
        let storage = stores.manager("alice@x").unwrap();
        let file = storage.file_by_path("/docs/a.txt").unwrap();

        service.submit_download(storage.account(), &file);
        wait_until(|| storage.file_by_id(file.id).unwrap().is_downloaded).await;

        let local = storage.file_by_id(file.id).unwrap().local_path.unwrap();
        assert_eq!(local, temp_dir.path().join("cache/alice@x/docs/a.txt"));
        assert_eq!(std::fs::read(local).unwrap(), b"alpha");
    }

    #[tokio::test]
    async fn test_download_folder_creates_directory() {
        let temp_dir = tempdir().unwrap();
        let stores = stores(temp_dir.path());
        let (service, _worker) = TransferService::spawn(Arc::clone(&stores));
        let storage = stores.manager("alice@x").unwrap();
        let root = storage.root().unwrap();

        service.submit_download(storage.account(), &root);
        wait_until(|| storage.root().unwrap().is_downloaded).await;
        assert!(temp_dir.path().join("cache/alice@x").is_dir());
    }

    #[tokio::test]
    async fn test_upload_copies_back_and_evicts() {
        let temp_dir = tempdir().unwrap();
        let stores = stores(temp_dir.path());
        let (service, _worker) = TransferService::spawn(Arc::clone(&stores));
        let storage = stores.manager("alice@x").unwrap();
        let file = storage.file_by_path("/docs/a.txt").unwrap();

        let local = temp_dir.path().join("cache/alice@x/docs/a.txt");
        std::fs::create_dir_all(local.parent().unwrap()).unwrap();
        std::fs::write(&local, b"alpha beta").unwrap();
        storage.mark_downloaded(file.id, local.clone()).unwrap();

        service.submit_upload(UploadRequest {
            account: storage.account().clone(),
            local_path: local.clone(),
            remote_path: "/docs/a.txt".to_string(),
            mime_type: Some("text/plain".to_string()),
            delete_local_after: true,
        });
        wait_until(|| !storage.file_by_id(file.id).unwrap().is_downloaded).await;

        let remote = temp_dir.path().join("remote/docs/a.txt");
        assert_eq!(std::fs::read(remote).unwrap(), b"alpha beta");
        assert!(!local.exists());
        assert_eq!(storage.file_by_id(file.id).unwrap().size, 10);
    }

    #[tokio::test]
    async fn test_unknown_account_does_not_stop_worker() {
        let temp_dir = tempdir().unwrap();
        let stores = stores(temp_dir.path());
        let (service, _worker) = TransferService::spawn(Arc::clone(&stores));
        let storage = stores.manager("alice@x").unwrap();
        let file = storage.file_by_path("/docs/a.txt").unwrap();

        service.submit_download(&Account::new("mallory@x"), &file);
        service.submit_download(storage.account(), &file);
        wait_until(|| storage.file_by_id(file.id).unwrap().is_downloaded).await;
    }
}
