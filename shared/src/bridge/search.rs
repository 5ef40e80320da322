//! Name search over one account's tree

use tracing::debug;

use crate::bridge::resolver::RequestContext;
use crate::core::{
    BridgeError, BridgeResult, DocumentId, RemoteFile, StorageManager, StorageResult, ROOT_PATH,
};

/// Recursive, case-sensitive substring search by file name
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchEngine {
    include_hidden: bool,
}

impl SearchEngine {
    pub fn new(include_hidden: bool) -> Self {
        Self { include_hidden }
    }

    /// Search the tree of the account whose root is `root_id`
    ///
    /// The walk always starts at the account's `/` folder. Folders are
    /// descended into, never matched themselves.
    pub fn search(
        &self,
        ctx: &mut RequestContext,
        root_id: DocumentId,
        query: &str,
    ) -> BridgeResult<Vec<RemoteFile>> {
        let storage = ctx.require_root(root_id)?;
        let root = storage
            .file_by_path(ROOT_PATH)
            .ok_or_else(|| BridgeError::RootNotFound {
                id: root_id.to_string(),
            })?;

        let mut matches = Vec::new();
        self.find_files(storage.as_ref(), &root, query, &mut matches)?;
        debug!(
            "Search for '{}' in {} matched {} files",
            query,
            storage.account(),
            matches.len()
        );
        Ok(matches)
    }

    /// Depth-first, pre-order walk; relies on the tree being acyclic
    fn find_files(
        &self,
        storage: &dyn StorageManager,
        folder: &RemoteFile,
        query: &str,
        matches: &mut Vec<RemoteFile>,
    ) -> StorageResult<()> {
        for file in storage.folder_content(folder, self.include_hidden)? {
            if file.is_folder {
                self.find_files(storage, &file, query, matches)?;
            } else if file.name().contains(query) {
                matches.push(file);
            }
        }
        Ok(())
    }
}
