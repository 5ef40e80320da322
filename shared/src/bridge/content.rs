//! Content access: download on demand, upload on close
//!
//! Opening a document that has no local copy submits a download and blocks
//! the calling thread until the storage manager reports the file as
//! downloaded, or until the caller cancels. The returned handle uploads the
//! local copy again when it is closed.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::resolver::RequestContext;
use crate::core::{
    AccessMode, BridgeError, BridgeResult, ContentAccess, DocumentId, RemoteFile, SizeHint,
    StorageManager, TransferSubsystem, UploadRequest,
};

/// How a download wait ended
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    /// The storage manager reported the file as downloaded
    Completed { file: RemoteFile, polls: u32 },
    /// The caller cancelled before the download completed
    Cancelled { polls: u32 },
}

/// Submits a download and waits for it to land in the local cache
#[derive(Clone)]
pub struct DownloadWaiter {
    transfer: Arc<dyn TransferSubsystem>,
    poll_interval: Duration,
}

impl DownloadWaiter {
    pub fn new(transfer: Arc<dyn TransferSubsystem>, poll_interval: Duration) -> Self {
        Self {
            transfer,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Download `file` and block until it is available locally
    ///
    /// Sleeps one poll interval, checks for cancellation, then re-reads the
    /// record. There is no timeout: without a cancellation token this only
    /// returns once the download completes. Cancellation is observed at poll
    /// boundaries only; the transfer itself keeps running.
    pub fn ensure_downloaded(
        &self,
        storage: &dyn StorageManager,
        file: &RemoteFile,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<DownloadOutcome> {
        info!(
            "Requesting download of {} ({}) for {}",
            file.remote_path,
            file.id,
            storage.account()
        );
        self.transfer.submit_download(storage.account(), file);

        let mut polls = 0u32;
        loop {
            thread::sleep(self.poll_interval);
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!("Download wait for {} cancelled after {} polls", file.id, polls);
                return Ok(DownloadOutcome::Cancelled { polls });
            }

            polls += 1;
            let current = storage
                .file_by_id(file.id)
                .ok_or_else(|| BridgeError::not_found(file.id))?;
            if current.is_downloaded {
                debug!("Download of {} completed after {} polls", file.id, polls);
                return Ok(DownloadOutcome::Completed {
                    file: current,
                    polls,
                });
            }
            debug!("Waiting for download of {} (poll {})", file.id, polls);
        }
    }
}

type CloseCallback = Box<dyn FnOnce() + Send>;

/// An opened document's local copy
///
/// Dropping or closing a read-write handle submits an upload of the local
/// copy with a delete-local-after policy. Read-only handles upload nothing.
pub struct ContentHandle {
    file: File,
    path: PathBuf,
    document_id: DocumentId,
    access: ContentAccess,
    on_close: Option<CloseCallback>,
}

impl ContentHandle {
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Path of the local cache copy backing this handle
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Access actually granted; `ReadOnly` means read-write was refused
    pub fn access(&self) -> ContentAccess {
        self.access
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    /// Flush pending writes, then run the close callback
    pub fn close(self) -> io::Result<()> {
        let result = match self.access {
            ContentAccess::ReadWrite => self.file.sync_all(),
            ContentAccess::ReadOnly => Ok(()),
        };
        drop(self);
        result
    }
}

impl std::fmt::Debug for ContentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHandle")
            .field("path", &self.path)
            .field("document_id", &self.document_id)
            .field("access", &self.access)
            .field("uploads_on_close", &self.on_close.is_some())
            .finish()
    }
}

impl Drop for ContentHandle {
    fn drop(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }
}

impl Read for ContentHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for ContentHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for ContentHandle {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

/// Read-only handle on a document's local copy, served as its thumbnail
#[derive(Debug)]
pub struct ThumbnailHandle {
    pub file: File,
    pub start_offset: u64,
    /// `None` means unknown length: read to end of file
    pub length: Option<u64>,
}

/// Materializes document content and arranges upload-on-close
#[derive(Clone)]
pub struct ContentAccessor {
    transfer: Arc<dyn TransferSubsystem>,
    waiter: DownloadWaiter,
}

impl ContentAccessor {
    pub fn new(transfer: Arc<dyn TransferSubsystem>, waiter: DownloadWaiter) -> Self {
        Self { transfer, waiter }
    }

    /// Open a document's content, downloading it first if needed
    ///
    /// Returns `Ok(None)` when the download wait was cancelled. Read-write
    /// access is always attempted; if the local copy refuses it the handle
    /// is downgraded to read-only with no upload on close.
    pub fn open_content(
        &self,
        ctx: &mut RequestContext,
        document_id: DocumentId,
        mode: AccessMode,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<Option<ContentHandle>> {
        let storage = ctx.require_any(document_id)?;
        let mut file = storage
            .file_by_id(document_id)
            .ok_or_else(|| BridgeError::not_found(document_id))?;
        debug!("Opening {} with mode {}", file.remote_path, mode);

        if !file.is_downloaded {
            match self.waiter.ensure_downloaded(storage.as_ref(), &file, cancel)? {
                DownloadOutcome::Completed { file: fresh, .. } => file = fresh,
                DownloadOutcome::Cancelled { .. } => return Ok(None),
            }
        }

        let local_path = file
            .local_path
            .clone()
            .ok_or_else(|| BridgeError::NotMaterialized {
                id: document_id.to_string(),
            })?;

        match OpenOptions::new().read(true).write(true).open(&local_path) {
            Ok(handle) => {
                let transfer = Arc::clone(&self.transfer);
                let request = UploadRequest {
                    account: storage.account().clone(),
                    local_path: local_path.clone(),
                    remote_path: file.remote_path.clone(),
                    mime_type: Some(file.mime_type.clone()),
                    delete_local_after: true,
                };
                let on_close: CloseCallback = Box::new(move || {
                    info!("Content closed, uploading {}", request.remote_path);
                    transfer.submit_upload(request);
                });

                Ok(Some(ContentHandle {
                    file: handle,
                    path: local_path,
                    document_id,
                    access: ContentAccess::ReadWrite,
                    on_close: Some(on_close),
                }))
            }
            Err(e) => {
                warn!(
                    "Read-write open of {:?} failed ({}), falling back to read-only",
                    local_path, e
                );
                let handle = File::open(&local_path)?;
                Ok(Some(ContentHandle {
                    file: handle,
                    path: local_path,
                    document_id,
                    access: ContentAccess::ReadOnly,
                    on_close: None,
                }))
            }
        }
    }

    /// Serve a document's local copy as its thumbnail, without decoding
    pub fn open_thumbnail(
        &self,
        ctx: &mut RequestContext,
        document_id: DocumentId,
        size_hint: SizeHint,
    ) -> BridgeResult<ThumbnailHandle> {
        let storage = ctx.require_root_or_any(document_id)?;
        let file = storage
            .file_by_id(document_id)
            .ok_or_else(|| BridgeError::not_found(document_id))?;
        debug!(
            "Thumbnail for {} requested at {}x{}",
            file.remote_path, size_hint.width, size_hint.height
        );

        let local_path = file
            .local_path
            .filter(|_| file.is_downloaded)
            .ok_or_else(|| BridgeError::NotMaterialized {
                id: document_id.to_string(),
            })?;

        Ok(ThumbnailHandle {
            file: File::open(local_path)?,
            start_offset: 0,
            length: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Account, MemoryStorageManager, RecordingTransfer};
    use std::time::Instant;

    fn waiter(transfer: Arc<RecordingTransfer>) -> DownloadWaiter {
        DownloadWaiter::new(transfer, Duration::from_millis(5))
    }

    #[test]
    fn test_wait_completes_when_record_flips() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MemoryStorageManager::new(Account::new("alice@x"));
        let file = storage.insert_file("/", "a.txt", 1, "text/plain").unwrap();
        let transfer = Arc::new(RecordingTransfer::new());

        let background = storage.clone();
        let local = dir.path().join("a.txt");
        let id = file.id;
        let worker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            std::fs::write(&local, b"a").unwrap();
            background.mark_downloaded(id, local).unwrap();
        });

        let outcome = waiter(Arc::clone(&transfer))
            .ensure_downloaded(&storage, &file, None)
            .unwrap();
        worker.join().unwrap();

        match outcome {
            DownloadOutcome::Completed { file, polls } => {
                assert!(file.is_downloaded);
                assert!(polls >= 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(transfer.download_count(), 1);
    }

    #[test]
    fn test_wait_observes_cancellation_at_poll_boundary() {
        let storage = MemoryStorageManager::new(Account::new("alice@x"));
        let file = storage.insert_file("/", "a.txt", 1, "text/plain").unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        let started = Instant::now();
        let outcome = waiter(Arc::new(RecordingTransfer::new()))
            .ensure_downloaded(&storage, &file, Some(&cancel))
            .unwrap();
        canceller.join().unwrap();

        assert!(matches!(outcome, DownloadOutcome::Cancelled { .. }));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
