//! Document creation through a local placeholder plus an upload job

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bridge::content::{DownloadOutcome, DownloadWaiter};
use crate::bridge::resolver::RequestContext;
use crate::core::{
    join_remote_path, BridgeError, BridgeResult, DocumentId, NewFileEntry, TransferSubsystem,
    UploadRequest, PATH_SEPARATOR,
};

/// Creates new remote documents
#[derive(Clone)]
pub struct DocumentCreator {
    transfer: Arc<dyn TransferSubsystem>,
    waiter: DownloadWaiter,
}

impl DocumentCreator {
    pub fn new(transfer: Arc<dyn TransferSubsystem>, waiter: DownloadWaiter) -> Self {
        Self { transfer, waiter }
    }

    /// Create `name` inside `parent_id`
    ///
    /// The parent folder is materialized first; this wait has no
    /// cancellation path. An empty placeholder is created in the parent's
    /// local directory, indexed by the owning storage manager, and queued for
    /// upload with a delete-local-after policy.
    ///
    /// # Returns
    /// * `Ok(Some(id))` - Id of the indexed placeholder
    /// * `Ok(None)` - The parent could not be materialized
    /// * `Err(BridgeError)` - Parent unresolvable, or creation failed
    pub fn create_document(
        &self,
        ctx: &mut RequestContext,
        parent_id: DocumentId,
        mime_type: &str,
        name: &str,
    ) -> BridgeResult<Option<DocumentId>> {
        info!("Creating '{}' ({}) under {}", name, mime_type, parent_id);
        validate_name(name)?;

        let storage = ctx.require_any(parent_id)?;
        let mut parent = storage
            .file_by_id(parent_id)
            .ok_or_else(|| BridgeError::not_found(parent_id))?;
        if !parent.is_folder {
            return Err(BridgeError::creation(format!(
                "{} is not a folder",
                parent.remote_path
            )));
        }

        if !parent.is_downloaded {
            match self.waiter.ensure_downloaded(storage.as_ref(), &parent, None)? {
                DownloadOutcome::Completed { file, .. } => parent = file,
                DownloadOutcome::Cancelled { .. } => return Ok(None),
            }
        }

        let parent_dir = parent.local_path.as_ref().ok_or_else(|| {
            BridgeError::creation(format!("{} has no local directory", parent.remote_path))
        })?;
        let placeholder = parent_dir.join(name);

        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&placeholder)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    BridgeError::creation(format!("{:?} already exists", placeholder))
                }
                _ => BridgeError::creation(format!("cannot create {:?}: {}", placeholder, e)),
            })?;
        debug!("Created placeholder {:?}", placeholder);

        let remote_path = join_remote_path(&parent.remote_path, name);
        let created = match storage.file_by_local_path(&placeholder) {
            Some(existing) => existing,
            None => storage
                .index_new_file(NewFileEntry {
                    parent_id: parent.id,
                    local_path: placeholder.clone(),
                    remote_path: remote_path.clone(),
                    mime_type: mime_type.to_string(),
                })
                .map_err(|e| {
                    // An unindexed placeholder would never be uploaded
                    let _ = std::fs::remove_file(&placeholder);
                    BridgeError::creation(format!("cannot index {}: {}", remote_path, e))
                })?,
        };

        self.transfer.submit_upload(UploadRequest {
            account: storage.account().clone(),
            local_path: placeholder,
            remote_path,
            mime_type: Some(mime_type.to_string()),
            delete_local_after: true,
        });

        info!("Created document {} at {}", created.id, created.remote_path);
        Ok(Some(created.id))
    }
}

fn validate_name(name: &str) -> BridgeResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(PATH_SEPARATOR) {
        return Err(BridgeError::creation(format!(
            "invalid document name '{name}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("report.pdf").is_ok());
        assert!(validate_name(".hidden").is_ok());
        assert_matches!(validate_name(""), Err(BridgeError::CreationFailed { .. }));
        assert_matches!(validate_name(".."), Err(BridgeError::CreationFailed { .. }));
        assert_matches!(validate_name("a/b"), Err(BridgeError::CreationFailed { .. }));
    }
}
