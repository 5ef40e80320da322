//! The document tree bridge
//!
//! [`DocumentsBridge`] exposes several account-scoped remote trees through a
//! single hierarchical-document API. Every operation builds a fresh
//! [`RequestContext`], resolves the owning storage manager through it, and
//! then delegates to the content accessor, the document creator or the
//! search engine.
//!
//! Listing roots, listing children, opening content and creating documents
//! rebuild the root registry first; the remaining operations resolve against
//! the last published registry snapshot.

pub mod content;
pub mod creator;
pub mod registry;
pub mod resolver;
pub mod search;

#[cfg(test)]
pub(crate) mod test_support;

pub use content::{ContentAccessor, ContentHandle, DownloadOutcome, DownloadWaiter, ThumbnailHandle};
pub use creator::DocumentCreator;
pub use registry::{RegistryEntry, RegistrySnapshot, RootRegistry};
pub use resolver::RequestContext;
pub use search::SearchEngine;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::core::{
    AccessMode, AccountSource, BridgeError, BridgeResult, DocumentId, RemoteFile, Root, SizeHint,
    StorageProvider, TransferSubsystem,
};

/// Unified document API over all configured accounts
pub struct DocumentsBridge {
    registry: RootRegistry,
    content: ContentAccessor,
    creator: DocumentCreator,
    search: SearchEngine,
    config: BridgeConfig,
}

impl std::fmt::Debug for DocumentsBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentsBridge").finish_non_exhaustive()
    }
}

impl DocumentsBridge {
    /// Create a bridge over the given collaborators
    pub fn new(
        accounts: Arc<dyn AccountSource>,
        storage: Arc<dyn StorageProvider>,
        transfer: Arc<dyn TransferSubsystem>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        config.validate()?;

        let waiter = DownloadWaiter::new(Arc::clone(&transfer), config.poll_interval());
        Ok(Self {
            registry: RootRegistry::new(accounts, storage),
            content: ContentAccessor::new(Arc::clone(&transfer), waiter.clone()),
            creator: DocumentCreator::new(transfer, waiter),
            search: SearchEngine::new(config.include_hidden),
            config,
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Context over a freshly rebuilt registry
    fn rebuilt_context(&self) -> RequestContext {
        RequestContext::new(self.registry.rebuild().0)
    }

    /// Context over the last published registry
    fn current_context(&self) -> RequestContext {
        RequestContext::new(self.registry.snapshot())
    }

    /// One root per configured account, in account-enumeration order
    pub fn list_roots(&self) -> Vec<Root> {
        let (_, roots) = self.registry.rebuild();
        debug!("Listing {} roots", roots.len());
        roots
    }

    /// Metadata of a single document
    pub fn get_document(&self, document_id: &str) -> BridgeResult<RemoteFile> {
        let id = DocumentId::parse(document_id)?;
        let mut ctx = self.current_context();
        let storage = ctx.require_root_or_any(id)?;
        storage.file_by_id(id).ok_or_else(|| BridgeError::not_found(id))
    }

    /// Immediate children of a folder
    pub fn list_children(&self, parent_id: &str) -> BridgeResult<Vec<RemoteFile>> {
        let id = DocumentId::parse(parent_id)?;
        let mut ctx = self.rebuilt_context();
        let storage = ctx.require_any(id)?;
        let folder = storage
            .file_by_id(id)
            .ok_or_else(|| BridgeError::not_found(id))?;
        Ok(storage.folder_content(&folder, self.config.include_hidden)?)
    }

    /// Open a document's content, downloading it on first access
    ///
    /// Returns `Ok(None)` when `cancel` fired before the download completed.
    pub fn open_content(
        &self,
        document_id: &str,
        mode: &str,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<Option<ContentHandle>> {
        let id = DocumentId::parse(document_id)?;
        let mode = AccessMode::parse(mode)?;
        let mut ctx = self.rebuilt_context();
        self.content.open_content(&mut ctx, id, mode, cancel)
    }

    /// Create a new document under `parent_id`, returning its id
    pub fn create_document(
        &self,
        parent_id: &str,
        mime_type: &str,
        name: &str,
    ) -> BridgeResult<Option<DocumentId>> {
        let id = DocumentId::parse(parent_id)?;
        let mut ctx = self.rebuilt_context();
        self.creator.create_document(&mut ctx, id, mime_type, name)
    }

    /// Read-only handle on the document's local copy
    pub fn get_thumbnail(
        &self,
        document_id: &str,
        size_hint: SizeHint,
    ) -> BridgeResult<ThumbnailHandle> {
        let id = DocumentId::parse(document_id)?;
        let mut ctx = self.current_context();
        self.content.open_thumbnail(&mut ctx, id, size_hint)
    }

    /// Files under the account of `root_id` whose name contains `query`
    pub fn search(&self, root_id: &str, query: &str) -> BridgeResult<Vec<RemoteFile>> {
        let id = DocumentId::parse(root_id)?;
        let mut ctx = self.current_context();
        self.search.search(&mut ctx, id, query)
    }

    /// Whether `document_id` is an immediate child of `parent_id`
    ///
    /// Any lookup failure answers `false`.
    pub fn is_child_document(&self, parent_id: &str, document_id: &str) -> bool {
        let Ok(id) = DocumentId::parse(document_id) else {
            return false;
        };
        match self.list_children(parent_id) {
            Ok(children) => children.iter().any(|child| child.id == id),
            Err(e) => {
                debug!("Child check under {} failed: {}", parent_id, e);
                false
            }
        }
    }
}
