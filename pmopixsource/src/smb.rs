//! SMB backend built on libsmbclient (`pavao`).
//!
//! libsmbclient is synchronous, so every call runs inside
//! `spawn_blocking`. A fresh client is created per operation from the
//! configuration's host/share/credentials; clients are never pooled
//! across scans.

use crate::model::{is_image_name, FolderEntry, ImageRef, SourceConfig};
use crate::{ImageBackend, ImageStream, Result, SourceError};
use async_trait::async_trait;
use pavao::{SmbClient, SmbCredentials, SmbDirentType, SmbOpenOptions, SmbOptions};
use std::io::Read;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::warn;

pub struct SmbBackend {
    config: Arc<SourceConfig>,
}

impl SmbBackend {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    fn connect(config: &SourceConfig) -> Result<SmbClient> {
        let host = config.host.trim_end_matches('/');
        let share = config.share.trim_matches('/');
        SmbClient::new(
            SmbCredentials::default()
                .server(format!("smb://{host}"))
                .share(format!("/{share}"))
                .username(&config.user)
                .password(&config.password),
            SmbOptions::default().one_share_per_server(true),
        )
        .map_err(|err| SourceError::Connection(err.to_string()))
    }

    /// Path of the configured root, relative to the share.
    fn root_path(config: &SourceConfig) -> String {
        let path = config.path.trim_matches('/');
        if path.is_empty() {
            "/".to_string()
        } else {
            format!("/{path}")
        }
    }

    /// Fully-qualified locator for a share-relative path.
    fn locator_for(config: &SourceConfig, path: &str) -> String {
        let host = config.host.trim_end_matches('/');
        let share = config.share.trim_matches('/');
        format!("smb://{host}/{share}{path}")
    }

    /// Share-relative path of a locator produced by [`Self::locator_for`].
    fn share_path(config: &SourceConfig, locator: &str) -> String {
        let host = config.host.trim_end_matches('/');
        let share = config.share.trim_matches('/');
        let prefix = format!("smb://{host}/{share}");
        locator.strip_prefix(&prefix).unwrap_or(locator).to_string()
    }
}

#[async_trait]
impl ImageBackend for SmbBackend {
    async fn scan(&self) -> Result<Vec<ImageRef>> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || scan_blocking(&config)).await?
    }

    async fn list_folders(&self, relative_path: &str) -> Result<Vec<FolderEntry>> {
        let config = Arc::clone(&self.config);
        let relative = relative_path.trim_matches('/').to_string();
        tokio::task::spawn_blocking(move || list_folders_blocking(&config, &relative)).await?
    }

    async fn open_stream(&self, reference: &ImageRef) -> Result<ImageStream> {
        let config = Arc::clone(&self.config);
        let path = Self::share_path(&config, &reference.locator);
        tokio::task::spawn_blocking(move || -> Result<ImageStream> {
            let client = SmbBackend::connect(&config)?;
            let mut file = client
                .open_with(&path, SmbOpenOptions::default().read(true))
                .map_err(|err| SourceError::Connection(err.to_string()))?;
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)?;
            Ok(Box::new(std::io::Cursor::new(buffer)))
        })
        .await?
    }
}

fn scan_blocking(config: &Arc<SourceConfig>) -> Result<Vec<ImageRef>> {
    let client = SmbBackend::connect(config)?;
    let mut references = Vec::new();
    let mut pending = vec![SmbBackend::root_path(config)];
    let mut is_root = true;

    while let Some(dir) = pending.pop() {
        let entries = match client.list_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if is_root => {
                return Err(SourceError::Connection(err.to_string()));
            }
            Err(err) => {
                warn!("Skipping SMB directory {}: {}", dir, err);
                continue;
            }
        };
        is_root = false;

        for entry in entries {
            let name = entry.name();
            if name == "." || name == ".." {
                continue;
            }
            let child = if dir == "/" {
                format!("/{name}")
            } else {
                format!("{dir}/{name}")
            };
            match entry.get_type() {
                SmbDirentType::Dir => {
                    if config.recursive {
                        pending.push(child);
                    }
                }
                SmbDirentType::File => {
                    if !is_image_name(name) {
                        continue;
                    }
                    let (last_modified, byte_size) = match client.stat(&child) {
                        Ok(stat) => (epoch_millis(stat.modified), stat.size),
                        Err(_) => (0, 0),
                    };
                    references.push(ImageRef::new(
                        SmbBackend::locator_for(config, &child),
                        Arc::clone(config),
                        last_modified,
                        byte_size,
                    ));
                }
                _ => {}
            }
        }
    }
    Ok(references)
}

fn list_folders_blocking(config: &Arc<SourceConfig>, relative: &str) -> Result<Vec<FolderEntry>> {
    let client = SmbBackend::connect(config)?;
    let dir = if relative.is_empty() {
        "/".to_string()
    } else {
        format!("/{relative}")
    };

    let entries = client
        .list_dir(&dir)
        .map_err(|err| SourceError::Connection(err.to_string()))?;

    let mut folders = Vec::new();
    for entry in entries {
        let name = entry.name();
        if name == "." || name == ".." {
            continue;
        }
        if matches!(entry.get_type(), SmbDirentType::Dir) {
            folders.push(FolderEntry {
                name: name.to_string(),
                is_directory: true,
            });
        }
    }
    folders.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(folders)
}

fn epoch_millis(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
