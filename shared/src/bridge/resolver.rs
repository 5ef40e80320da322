//! Document resolution
//!
//! Every bridge operation starts by working out which account's storage
//! manager owns the id it was handed. The answer is kept in a
//! [`RequestContext`] that lives for exactly one request, so concurrent
//! requests never observe each other's resolutions.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::bridge::registry::RegistrySnapshot;
use crate::core::{BridgeError, BridgeResult, DocumentId, StorageManager};

/// Resolution state of a single request
pub struct RequestContext {
    snapshot: Arc<RegistrySnapshot>,
    current: Option<Arc<dyn StorageManager>>,
}

impl RequestContext {
    pub fn new(snapshot: Arc<RegistrySnapshot>) -> Self {
        Self {
            snapshot,
            current: None,
        }
    }

    /// The registry snapshot this request resolves against
    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    /// The most recently resolved storage manager
    pub fn current(&self) -> Option<&Arc<dyn StorageManager>> {
        self.current.as_ref()
    }

    /// Resolve an id known to be an account root
    ///
    /// The current manager is only reassigned when it does not already point
    /// at the target. Returns `None` when `id` is not a registered root.
    pub fn resolve_as_root(&mut self, id: DocumentId) -> Option<Arc<dyn StorageManager>> {
        let target = self.snapshot.get(id)?;
        let already_current = self
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, target));
        if !already_current {
            debug!("Resolved root {} to account {}", id, target.account());
            self.current = Some(Arc::clone(target));
        }
        self.current.clone()
    }

    /// Resolve any document id by scanning all registered managers
    ///
    /// Managers are asked in registry order and the first one that knows the
    /// id wins. Ids are only unique per account, so when a second manager also
    /// claims the id the collision is logged and the first match is kept.
    /// When nothing matches the current manager is left unset.
    pub fn resolve_as_any(&mut self, id: DocumentId) -> Option<Arc<dyn StorageManager>> {
        let mut owners = self
            .snapshot
            .managers()
            .filter(|manager| manager.file_by_id(id).is_some());

        let Some(first) = owners.next() else {
            debug!("No registered account knows document {}", id);
            return None;
        };
        for other in owners {
            warn!(
                "Document id {} exists in accounts {} and {}; using {}",
                id,
                first.account(),
                other.account(),
                first.account()
            );
        }

        self.current = Some(Arc::clone(first));
        self.current.clone()
    }

    /// `resolve_as_root`, raising RootNotFound on failure
    pub fn require_root(&mut self, id: DocumentId) -> BridgeResult<Arc<dyn StorageManager>> {
        self.resolve_as_root(id)
            .ok_or_else(|| BridgeError::RootNotFound { id: id.to_string() })
    }

    /// `resolve_as_any`, raising DocumentNotFound on failure
    pub fn require_any(&mut self, id: DocumentId) -> BridgeResult<Arc<dyn StorageManager>> {
        self.resolve_as_any(id).ok_or_else(|| BridgeError::not_found(id))
    }

    /// Root lookup first, falling back to a scan for non-root ids
    pub fn require_root_or_any(&mut self, id: DocumentId) -> BridgeResult<Arc<dyn StorageManager>> {
        match self.resolve_as_root(id) {
            Some(storage) => Ok(storage),
            None => self.require_any(id),
        }
    }
}
