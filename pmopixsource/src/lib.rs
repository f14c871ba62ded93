//! # pmopixsource
//!
//! Source configurations and protocol-polymorphic scanners for PMOWall.
//!
//! A [`SourceConfig`] describes one storage backend instance (local
//! directory, SMB share or WebDAV collection). Scanning a source produces a
//! flat list of [`ImageRef`] values carrying the best-available
//! last-modified/size metadata, which later keys the artifact cache.
//!
//! ## Capability interface
//!
//! Every backend sits behind the same [`ImageBackend`] trait:
//!
//! - `scan` — enumerate every eligible image under the source
//! - `list_folders` — immediate sub-directories only, for directory pickers
//! - `open_stream` — byte stream for one discovered reference
//!
//! [`backend_for`] is the only place that dispatches on [`SourceKind`], so
//! call sites never branch on the backend themselves.
//!
//! ## Error policy
//!
//! Backend operations return [`SourceError`]; bulk scanning through
//! [`scan_all`] swallows per-source failures (a broken share contributes
//! zero references instead of aborting the batch), while `list_folders`
//! propagates failures so a picker UI can surface them.
//!
//! ## Features
//!
//! - `smb` — enables the SMB backend (`pavao`, requires the system
//!   libsmbclient). Without it, scanning an SMB source reports
//!   [`SourceError::SmbUnavailable`], which bulk scans swallow.

pub mod local;
pub mod model;
#[cfg(feature = "smb")]
pub mod smb;
pub mod webdav;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

pub use model::{is_image_name, FolderEntry, ImageRef, SourceConfig, SourceKind, IMAGE_EXTENSIONS};

/// Byte stream handed to the fetch pipeline's download stage.
pub type ImageStream = Box<dyn AsyncRead + Send + Unpin>;

/// Error types for source operations
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("SMB support is not compiled in (enable the `smb` feature)")]
    SmbUnavailable,
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;

/// Common interface over the closed set of storage backends.
///
/// Implementations are `Send + Sync`; credentials travel inside the
/// backend's own [`SourceConfig`] and are never shared globally. Remote
/// backends open a fresh connection per call and never pool them across
/// scans.
#[async_trait::async_trait]
pub trait ImageBackend: Send + Sync {
    /// Enumerates every eligible image currently reachable under the
    /// source, descending into sub-directories when the configuration says
    /// so. Eligibility is the case-insensitive extension allow-list of
    /// [`is_image_name`].
    async fn scan(&self) -> Result<Vec<ImageRef>>;

    /// Lists the immediate sub-directories under `relative_path`, sorted
    /// by name. Connection and authentication failures are propagated to
    /// the caller.
    async fn list_folders(&self, relative_path: &str) -> Result<Vec<FolderEntry>>;

    /// Opens a byte stream for a discovered reference.
    async fn open_stream(&self, reference: &ImageRef) -> Result<ImageStream>;
}

/// Returns the backend implementation for a source configuration.
pub fn backend_for(config: &SourceConfig) -> Box<dyn ImageBackend> {
    match config.kind {
        SourceKind::Local => Box::new(local::LocalBackend::new(config.clone())),
        SourceKind::Webdav => Box::new(webdav::WebDavBackend::new(config.clone())),
        #[cfg(feature = "smb")]
        SourceKind::Smb => Box::new(smb::SmbBackend::new(config.clone())),
        #[cfg(not(feature = "smb"))]
        SourceKind::Smb => Box::new(SmbDisabled),
    }
}

/// Scans every configured source and concatenates the results.
///
/// Per-source failures are logged and swallowed so that one unreachable
/// backend cannot abort a multi-source session.
pub async fn scan_all(configs: &[SourceConfig]) -> Vec<ImageRef> {
    let mut references = Vec::new();
    for config in configs {
        match backend_for(config).scan().await {
            Ok(mut found) => {
                debug!("Source {} contributed {} image(s)", config.id, found.len());
                references.append(&mut found);
            }
            Err(err) => {
                warn!("Skipping source {}: {}", config.id, err);
            }
        }
    }
    references
}

#[cfg(not(feature = "smb"))]
struct SmbDisabled;

#[cfg(not(feature = "smb"))]
#[async_trait::async_trait]
impl ImageBackend for SmbDisabled {
    async fn scan(&self) -> Result<Vec<ImageRef>> {
        Err(SourceError::SmbUnavailable)
    }

    async fn list_folders(&self, _relative_path: &str) -> Result<Vec<FolderEntry>> {
        Err(SourceError::SmbUnavailable)
    }

    async fn open_stream(&self, _reference: &ImageRef) -> Result<ImageStream> {
        Err(SourceError::SmbUnavailable)
    }
}
