//! API handlers for DocBridge backend requests
//!
//! This module sits between the IPC layer and the document bridge. Bridge
//! calls block (opening content may wait for a download), so each one runs
//! on tokio's blocking pool. Open content handles are kept here, keyed by a
//! handle id the client uses to close them again, and in-flight opens can be
//! cancelled by the request id that started them.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BackendError, BackendResult, IpcError};
use docbridge_shared::{
    BridgeError, BridgeResult, ContentAccess, ContentHandle, DocumentFlags, DocumentsBridge,
    RemoteFile, Root, SizeHint,
};

/// Document metadata as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    pub document_id: String,
    pub parent_id: Option<String>,
    pub display_name: String,
    pub mime_type: String,
    pub size: u64,
    /// RFC 3339 timestamp
    pub last_modified: Option<String>,
    pub is_downloaded: bool,
    pub flags: DocumentFlags,
}

impl From<&RemoteFile> for DocumentInfo {
    fn from(file: &RemoteFile) -> Self {
        Self {
            document_id: file.id.to_string(),
            parent_id: file.parent_id.map(|id| id.to_string()),
            display_name: file.name().to_string(),
            mime_type: file.mime_type.clone(),
            size: file.size,
            last_modified: file.last_modified.map(|time| time.to_rfc3339()),
            is_downloaded: file.is_downloaded,
            flags: file.flags(),
        }
    }
}

/// An opened document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedDocument {
    pub handle_id: Uuid,
    pub document_id: String,
    pub local_path: PathBuf,
    pub access: ContentAccess,
}

/// Where a thumbnail's bytes can be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailInfo {
    pub document_id: String,
    pub local_path: PathBuf,
    pub start_offset: u64,
    pub length: Option<u64>,
}

/// Identifies one client connection
///
/// Pending opens and open handles belong to the connection that created
/// them; other connections can neither cancel nor close them.
pub type ConnectionId = Uuid;

struct PendingOpen {
    open_id: Uuid,
    token: CancellationToken,
}

struct OpenHandle {
    connection: ConnectionId,
    handle: ContentHandle,
}

/// API handlers for processing requests
pub struct ApiHandlers {
    bridge: Arc<DocumentsBridge>,
    open_handles: Mutex<HashMap<Uuid, OpenHandle>>,
    pending_opens: Mutex<HashMap<(ConnectionId, String), PendingOpen>>,
}

impl ApiHandlers {
    /// Create new API handlers
    pub fn new(bridge: Arc<DocumentsBridge>) -> Self {
        Self {
            bridge,
            open_handles: Mutex::new(HashMap::new()),
            pending_opens: Mutex::new(HashMap::new()),
        }
    }

    /// Run a bridge call on the blocking pool
    async fn blocking<T, F>(&self, op: F) -> BackendResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentsBridge) -> BridgeResult<T> + Send + 'static,
    {
        let bridge = Arc::clone(&self.bridge);
        tokio::task::spawn_blocking(move || op(&bridge))
            .await
            .map_err(|e| BackendError::Internal {
                message: format!("bridge task failed: {}", e),
            })?
            .map_err(BackendError::from)
    }

    pub async fn list_roots(&self) -> BackendResult<Vec<Root>> {
        debug!("API: Listing roots");
        self.blocking(|bridge| Ok(bridge.list_roots())).await
    }

    pub async fn get_document(&self, document_id: String) -> BackendResult<DocumentInfo> {
        debug!("API: Getting document {}", document_id);
        let file = self
            .blocking(move |bridge| bridge.get_document(&document_id))
            .await?;
        Ok(DocumentInfo::from(&file))
    }

    pub async fn list_children(&self, parent_id: String) -> BackendResult<Vec<DocumentInfo>> {
        debug!("API: Listing children of {}", parent_id);
        let children = self
            .blocking(move |bridge| bridge.list_children(&parent_id))
            .await?;
        Ok(children.iter().map(DocumentInfo::from).collect())
    }

    /// Open a document, waiting for its download if needed
    ///
    /// `request_id` identifies the open for [`ApiHandlers::cancel_request`]
    /// and must not already be pending on `connection`. Returns `None` when
    /// the open was cancelled.
    pub async fn open_document(
        &self,
        connection: ConnectionId,
        request_id: String,
        document_id: String,
        mode: String,
    ) -> BackendResult<Option<OpenedDocument>> {
        info!("API: Opening document {} with mode {}", document_id, mode);

        let key = (connection, request_id);
        let open_id = Uuid::new_v4();
        let token = CancellationToken::new();
        match self.pending_opens.lock().await.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(IpcError::DuplicateRequest { request_id: key.1 }.into());
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingOpen {
                    open_id,
                    token: token.clone(),
                });
            }
        }

        let result = self
            .blocking(move |bridge| bridge.open_content(&document_id, &mode, Some(&token)))
            .await;
        {
            let mut pending = self.pending_opens.lock().await;
            if pending.get(&key).is_some_and(|open| open.open_id == open_id) {
                pending.remove(&key);
            }
        }

        let Some(handle) = result? else {
            info!("API: Open request {} was cancelled", key.1);
            return Ok(None);
        };
        if handle.access() == ContentAccess::ReadOnly {
            warn!(
                "API: Document {} opened read-only, changes will not be uploaded",
                handle.document_id()
            );
        }

        let opened = OpenedDocument {
            handle_id: Uuid::new_v4(),
            document_id: handle.document_id().to_string(),
            local_path: handle.path().to_path_buf(),
            access: handle.access(),
        };
        self.open_handles
            .lock()
            .await
            .insert(opened.handle_id, OpenHandle { connection, handle });
        Ok(Some(opened))
    }

    /// Close an open document, uploading it if it was opened read-write
    pub async fn close_document(
        &self,
        connection: ConnectionId,
        handle_id: Uuid,
    ) -> BackendResult<()> {
        let owned = {
            let mut handles = self.open_handles.lock().await;
            let is_owner = handles
                .get(&handle_id)
                .is_some_and(|open| open.connection == connection);
            if is_owner {
                handles.remove(&handle_id)
            } else {
                None
            }
        };
        let handle = owned
            .ok_or_else(|| IpcError::UnknownHandle {
                handle_id: handle_id.to_string(),
            })?
            .handle;

        info!("API: Closing document {}", handle.document_id());
        self.blocking(move |_| Ok(handle.close()?)).await
    }

    /// Cancel an in-flight open; false when no such open is pending
    pub async fn cancel_request(&self, connection: ConnectionId, request_id: &str) -> bool {
        let key = (connection, request_id.to_string());
        match self.pending_opens.lock().await.get(&key) {
            Some(open) => {
                info!("API: Cancelling request {}", request_id);
                open.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every open still pending on `connection`
    pub async fn cancel_connection_requests(&self, connection: ConnectionId) -> usize {
        let pending = self.pending_opens.lock().await;
        let mut cancelled = 0;
        for ((owner, request_id), open) in pending.iter() {
            if *owner == connection {
                debug!("API: Cancelling request {} of a closed connection", request_id);
                open.token.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Close every handle `connection` left open, uploading as a close would
    pub async fn close_connection_handles(&self, connection: ConnectionId) -> usize {
        let orphaned: Vec<ContentHandle> = {
            let mut handles = self.open_handles.lock().await;
            let ids: Vec<Uuid> = handles
                .iter()
                .filter(|(_, open)| open.connection == connection)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| handles.remove(id))
                .map(|open| open.handle)
                .collect()
        };

        let count = orphaned.len();
        for handle in orphaned {
            let document_id = handle.document_id();
            info!("API: Closing document {} left open by its client", document_id);
            if let Err(e) = self.blocking(move |_| Ok(handle.close()?)).await {
                warn!("API: Closing document {} failed: {}", document_id, e);
            }
        }
        count
    }

    pub async fn open_handle_count(&self) -> usize {
        self.open_handles.lock().await.len()
    }

    pub async fn pending_open_count(&self) -> usize {
        self.pending_opens.lock().await.len()
    }

    pub async fn create_document(
        &self,
        parent_id: String,
        mime_type: String,
        display_name: String,
    ) -> BackendResult<Option<DocumentInfo>> {
        info!("API: Creating '{}' under {}", display_name, parent_id);
        self.blocking(move |bridge| {
            let Some(id) = bridge.create_document(&parent_id, &mime_type, &display_name)? else {
                return Ok(None);
            };
            let file = bridge.get_document(&id.to_string())?;
            Ok(Some(DocumentInfo::from(&file)))
        })
        .await
    }

    pub async fn get_thumbnail(
        &self,
        document_id: String,
        size_hint: SizeHint,
    ) -> BackendResult<ThumbnailInfo> {
        debug!("API: Getting thumbnail of {}", document_id);
        self.blocking(move |bridge| {
            let thumbnail = bridge.get_thumbnail(&document_id, size_hint)?;
            let file = bridge.get_document(&document_id)?;
            let local_path = file.local_path.ok_or_else(|| BridgeError::NotMaterialized {
                id: document_id.clone(),
            })?;
            Ok(ThumbnailInfo {
                document_id,
                local_path,
                start_offset: thumbnail.start_offset,
                length: thumbnail.length,
            })
        })
        .await
    }

    pub async fn search(&self, root_id: String, query: String) -> BackendResult<Vec<DocumentInfo>> {
        debug!("API: Searching '{}' in {}", query, root_id);
        let found = self
            .blocking(move |bridge| bridge.search(&root_id, &query))
            .await?;
        Ok(found.iter().map(DocumentInfo::from).collect())
    }

    pub async fn is_child_document(
        &self,
        parent_id: String,
        document_id: String,
    ) -> BackendResult<bool> {
        self.blocking(move |bridge| Ok(bridge.is_child_document(&parent_id, &document_id)))
            .await
    }
}
