//! Value types shared by the scanners, the fetch pipeline and the
//! prefetch buffer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Case-insensitive extension allow-list for eligible images
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "gif"];

/// Storage backend kind of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Smb,
    Webdav,
}

/// User-defined descriptor of one storage backend instance.
///
/// Immutable once created; editing a source means replacing the whole
/// value. The core only ever reads these — persistence belongs to the
/// configuration layer. Credentials are carried by value and travel with
/// every [`ImageRef`] discovered under the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "generate_id")]
    pub id: String,
    pub kind: SourceKind,
    /// Local directory, or path below the share/collection root
    #[serde(default)]
    pub path: String,
    /// SMB host name, or WebDAV base URL
    #[serde(default)]
    pub host: String,
    /// SMB share name (unused for other kinds)
    #[serde(default)]
    pub share: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    /// Whether sub-directories are descended during a scan
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_recursive() -> bool {
    true
}

impl SourceConfig {
    /// Local filesystem source rooted at `path`.
    pub fn local(path: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            kind: SourceKind::Local,
            path: path.into(),
            host: String::new(),
            share: String::new(),
            user: String::new(),
            password: String::new(),
            recursive: true,
        }
    }

    /// SMB share source.
    pub fn smb(
        host: impl Into<String>,
        share: impl Into<String>,
        path: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            kind: SourceKind::Smb,
            path: path.into(),
            host: host.into(),
            share: share.into(),
            user: user.into(),
            password: password.into(),
            recursive: true,
        }
    }

    /// WebDAV collection source.
    pub fn webdav(
        host: impl Into<String>,
        path: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            kind: SourceKind::Webdav,
            path: path.into(),
            host: host.into(),
            share: String::new(),
            user: user.into(),
            password: password.into(),
            recursive: true,
        }
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }
}

/// One discovered image: an opaque locator plus the metadata that keys the
/// artifact cache.
///
/// References are regenerated on every scan and have no lifecycle of their
/// own; `last_modified`/`byte_size` are 0 when the backend cannot supply
/// them.
#[derive(Debug, Clone)]
pub struct ImageRef {
    /// Absolute local path or fully-qualified remote URL
    pub locator: String,
    /// The source configuration this reference came from
    pub source: Arc<SourceConfig>,
    /// Last modification, epoch milliseconds (0 if unknown)
    pub last_modified: i64,
    /// Size in bytes (0 if unknown)
    pub byte_size: u64,
}

impl ImageRef {
    pub fn new(
        locator: impl Into<String>,
        source: Arc<SourceConfig>,
        last_modified: i64,
        byte_size: u64,
    ) -> Self {
        Self {
            locator: locator.into(),
            source,
            last_modified,
            byte_size,
        }
    }
}

/// One row of a directory picker listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub is_directory: bool,
}

/// Checks the extension allow-list against a final path segment.
pub fn is_image_name(name: &str) -> bool {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return false,
    };
    IMAGE_EXTENSIONS
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(ext))
}
