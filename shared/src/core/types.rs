//! Type definitions for the document tree bridge.
//!
//! These types describe remote file records as the storage managers expose
//! them, and the descriptors the bridge hands back to hosts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::errors::BridgeError;

/// Remote path of every account's tree root
pub const ROOT_PATH: &str = "/";

/// Separator used in remote paths
pub const PATH_SEPARATOR: char = '/';

/// Mime type reported for folders
pub const DIRECTORY_MIME_TYPE: &str = "inode/directory";

/// Opaque account identity, e.g. `alice@cloud.example.com`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub name: String,
}

impl Account {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// User part of the account name (everything before the last `@`)
    pub fn user(&self) -> &str {
        match self.name.rfind('@') {
            Some(idx) => &self.name[..idx],
            None => &self.name,
        }
    }

    /// Host part of the account name, if any
    pub fn host(&self) -> Option<&str> {
        self.name.rfind('@').map(|idx| &self.name[idx + 1..])
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Numeric document identifier, string-encoded at the host boundary.
///
/// Ids are stable within their owning account only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

impl DocumentId {
    /// Parse a host-supplied id string
    pub fn parse(id: &str) -> Result<Self, BridgeError> {
        id.parse()
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl FromStr for DocumentId {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(DocumentId)
            .map_err(|_| BridgeError::MalformedId { id: s.to_string() })
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for DocumentId {
    fn from(value: u64) -> Self {
        DocumentId(value)
    }
}

/// One entry of a remote tree, as indexed by its storage manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: DocumentId,
    /// Id of the containing folder; `None` for the root
    pub parent_id: Option<DocumentId>,
    /// Absolute remote path, `/` for the root, no trailing separator otherwise
    pub remote_path: String,
    /// Path of the local cache copy, when one has been assigned
    pub local_path: Option<PathBuf>,
    pub is_folder: bool,
    pub is_downloaded: bool,
    pub size: u64,
    pub mime_type: String,
    pub last_modified: Option<DateTime<Utc>>,
}

impl RemoteFile {
    /// Display name: the last segment of the remote path
    pub fn name(&self) -> &str {
        if self.is_root() {
            return ROOT_PATH;
        }
        self.remote_path
            .trim_end_matches(PATH_SEPARATOR)
            .rsplit(PATH_SEPARATOR)
            .next()
            .unwrap_or_default()
    }

    pub fn is_root(&self) -> bool {
        self.remote_path == ROOT_PATH
    }

    /// Hidden entries are dot-files, as on the remote servers
    pub fn is_hidden(&self) -> bool {
        !self.is_root() && self.name().starts_with('.')
    }

    pub fn flags(&self) -> DocumentFlags {
        DocumentFlags {
            supports_write: !self.is_folder,
            dir_supports_create: self.is_folder,
            supports_thumbnail: !self.is_folder && self.mime_type.starts_with("image/"),
        }
    }
}

/// Join a child name onto a remote folder path.
///
/// The root folder is `/`, so its children become `/name` rather than
/// `//name`.
pub fn join_remote_path(parent: &str, name: &str) -> String {
    let parent = parent.trim_end_matches(PATH_SEPARATOR);
    format!("{parent}{PATH_SEPARATOR}{name}")
}

/// Capabilities advertised for a single document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentFlags {
    pub supports_write: bool,
    pub dir_supports_create: bool,
    pub supports_thumbnail: bool,
}

/// Capabilities advertised for an account root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootFlags {
    pub supports_create: bool,
    pub supports_search: bool,
    pub supports_is_child: bool,
}

impl Default for RootFlags {
    fn default() -> Self {
        Self {
            supports_create: true,
            supports_search: true,
            supports_is_child: true,
        }
    }
}

/// Top-level entry point of one account's tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    /// Root identifier; the id of the account's `/` record
    pub root_id: DocumentId,
    /// Document id of the root folder (same value as `root_id`)
    pub document_id: DocumentId,
    pub title: String,
    pub summary: Option<String>,
    pub flags: RootFlags,
    pub mime_types: String,
}

impl Root {
    pub fn for_account(account: &Account, root_dir: &RemoteFile) -> Self {
        Self {
            root_id: root_dir.id,
            document_id: root_dir.id,
            title: account.user().to_string(),
            summary: account.host().map(str::to_string),
            flags: RootFlags::default(),
            mime_types: "*/*".to_string(),
        }
    }
}

/// Access mode requested by the host when opening content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    /// Parse a host mode string (`r`, `w`, `wt`, `wa`, `rw`, `rwt`)
    pub fn parse(mode: &str) -> Result<Self, BridgeError> {
        match mode {
            "r" => Ok(AccessMode::Read),
            "w" | "wt" | "wa" => Ok(AccessMode::Write),
            "rw" | "rwt" => Ok(AccessMode::ReadWrite),
            _ => Err(BridgeError::InvalidMode {
                mode: mode.to_string(),
            }),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::Read => write!(f, "r"),
            AccessMode::Write => write!(f, "w"),
            AccessMode::ReadWrite => write!(f, "rw"),
        }
    }
}

/// Access actually granted on an opened content handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentAccess {
    ReadWrite,
    /// Read-write was refused; no upload happens on close
    ReadOnly,
}

/// Requested thumbnail dimensions, passed through for logging only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizeHint {
    pub width: u32,
    pub height: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn file(path: &str, is_folder: bool, mime: &str) -> RemoteFile {
        RemoteFile {
            id: DocumentId(1),
            parent_id: None,
            remote_path: path.to_string(),
            local_path: None,
            is_folder,
            is_downloaded: false,
            size: 0,
            mime_type: mime.to_string(),
            last_modified: None,
        }
    }

    #[test]
    fn test_document_id_parsing() {
        assert_eq!(DocumentId::parse("42").unwrap(), DocumentId(42));
        assert_eq!(DocumentId::parse(" 7 ").unwrap(), DocumentId(7));
        assert_matches!(
            DocumentId::parse("not-a-number"),
            Err(BridgeError::MalformedId { .. })
        );
        assert_matches!(DocumentId::parse("-1"), Err(BridgeError::MalformedId { .. }));
    }

    #[test]
    fn test_account_parts() {
        let account = Account::new("alice@cloud.example.com");
        assert_eq!(account.user(), "alice");
        assert_eq!(account.host(), Some("cloud.example.com"));

        let local = Account::new("bob");
        assert_eq!(local.user(), "bob");
        assert_eq!(local.host(), None);
    }

    #[test]
    fn test_remote_file_name() {
        assert_eq!(file("/", true, DIRECTORY_MIME_TYPE).name(), "/");
        assert_eq!(file("/Photos", true, DIRECTORY_MIME_TYPE).name(), "Photos");
        assert_eq!(file("/Photos/cat.jpg", false, "image/jpeg").name(), "cat.jpg");
        assert!(file("/.hidden", false, "text/plain").is_hidden());
        assert!(!file("/", true, DIRECTORY_MIME_TYPE).is_hidden());
    }

    #[test]
    fn test_join_remote_path() {
        assert_eq!(join_remote_path("/", "a.txt"), "/a.txt");
        assert_eq!(join_remote_path("/Documents", "a.txt"), "/Documents/a.txt");
        assert_eq!(join_remote_path("/Documents/", "a.txt"), "/Documents/a.txt");
    }

    #[test]
    fn test_document_flags() {
        let image = file("/cat.png", false, "image/png");
        assert!(image.flags().supports_thumbnail);
        assert!(image.flags().supports_write);

        let folder = file("/Photos", true, DIRECTORY_MIME_TYPE);
        assert!(folder.flags().dir_supports_create);
        assert!(!folder.flags().supports_write);
        assert!(!folder.flags().supports_thumbnail);
    }

    #[test]
    fn test_access_mode_parsing() {
        assert_eq!(AccessMode::parse("r").unwrap(), AccessMode::Read);
        assert_eq!(AccessMode::parse("wt").unwrap(), AccessMode::Write);
        assert_eq!(AccessMode::parse("rwt").unwrap(), AccessMode::ReadWrite);
        assert_matches!(AccessMode::parse("x"), Err(BridgeError::InvalidMode { .. }));
    }

    #[test]
    fn test_root_for_account() {
        let mut root_dir = file("/", true, DIRECTORY_MIME_TYPE);
        root_dir.id = DocumentId(9);
        let root = Root::for_account(&Account::new("alice@cloud.example.com"), &root_dir);

        assert_eq!(root.root_id, DocumentId(9));
        assert_eq!(root.document_id, DocumentId(9));
        assert_eq!(root.title, "alice");
        assert_eq!(root.summary.as_deref(), Some("cloud.example.com"));
        assert!(root.flags.supports_search);
    }
}
