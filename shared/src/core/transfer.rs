//! Transfer subsystem interface
//!
//! Downloads and uploads run outside the bridge. Submission is
//! fire-and-forget: the only completion signal the bridge ever sees is the
//! downloaded flag of the file record changing in the storage manager.

use std::path::PathBuf;
use std::sync::Mutex;

use crate::core::types::{Account, DocumentId, RemoteFile};

/// Upload job handed to the transfer subsystem
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub account: Account,
    pub local_path: PathBuf,
    pub remote_path: String,
    pub mime_type: Option<String>,
    /// Remove the local copy once the upload succeeded
    pub delete_local_after: bool,
}

/// Executes downloads and uploads on behalf of the bridge
pub trait TransferSubsystem: Send + Sync {
    /// Queue a download of `file` into the account's local cache
    fn submit_download(&self, account: &Account, file: &RemoteFile);

    /// Queue an upload of a local file to its remote path
    fn submit_upload(&self, request: UploadRequest);
}

/// A transfer job as recorded by [`RecordingTransfer`]
#[derive(Debug, Clone, PartialEq)]
pub enum TransferJob {
    Download { account: Account, file_id: DocumentId },
    Upload(UploadRequest),
}

/// Transfer subsystem that only records submissions
///
/// Useful for hosts that want to inspect what the bridge asked for, and for
/// tests.
#[derive(Debug, Default)]
pub struct RecordingTransfer {
    jobs: Mutex<Vec<TransferJob>>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All jobs submitted so far, in submission order
    pub fn jobs(&self) -> Vec<TransferJob> {
        self.jobs.lock().map(|jobs| jobs.clone()).unwrap_or_default()
    }

    pub fn download_count(&self) -> usize {
        self.jobs()
            .iter()
            .filter(|job| matches!(job, TransferJob::Download { .. }))
            .count()
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.jobs()
            .into_iter()
            .filter_map(|job| match job {
                TransferJob::Upload(request) => Some(request),
                TransferJob::Download { .. } => None,
            })
            .collect()
    }

    fn record(&self, job: TransferJob) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.push(job);
        }
    }
}

impl TransferSubsystem for RecordingTransfer {
    fn submit_download(&self, account: &Account, file: &RemoteFile) {
        self.record(TransferJob::Download {
            account: account.clone(),
            file_id: file.id,
        });
    }

    fn submit_upload(&self, request: UploadRequest) {
        self.record(TransferJob::Upload(request));
    }
}
