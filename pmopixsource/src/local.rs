//! Local filesystem backend.

use crate::model::{is_image_name, FolderEntry, ImageRef, SourceConfig};
use crate::{ImageBackend, ImageStream, Result, SourceError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use walkdir::WalkDir;

pub struct LocalBackend {
    config: Arc<SourceConfig>,
}

impl LocalBackend {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl ImageBackend for LocalBackend {
    async fn scan(&self) -> Result<Vec<ImageRef>> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || scan_blocking(&config)).await?
    }

    async fn list_folders(&self, relative_path: &str) -> Result<Vec<FolderEntry>> {
        let root = Path::new(&self.config.path).join(relative_path.trim_start_matches('/'));
        let folders = tokio::task::spawn_blocking(move || -> Result<Vec<FolderEntry>> {
            let mut folders = Vec::new();
            for entry in std::fs::read_dir(&root)? {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(_) => continue,
                };
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    folders.push(FolderEntry {
                        name: entry.file_name().to_string_lossy().into_owned(),
                        is_directory: true,
                    });
                }
            }
            folders.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(folders)
        })
        .await??;
        Ok(folders)
    }

    async fn open_stream(&self, reference: &ImageRef) -> Result<ImageStream> {
        let file = tokio::fs::File::open(&reference.locator).await?;
        Ok(Box::new(file))
    }
}

fn scan_blocking(config: &Arc<SourceConfig>) -> Result<Vec<ImageRef>> {
    let root = Path::new(&config.path);
    if !root.is_dir() {
        return Err(SourceError::Connection(format!(
            "no such directory: {}",
            config.path
        )));
    }

    let mut references = Vec::new();
    if config.recursive {
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            if !is_image_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            references.push(file_reference(entry.path(), entry.metadata().ok(), config));
        }
    } else {
        for entry in std::fs::read_dir(root)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(_) => continue,
            };
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !is_image_name(&entry.file_name().to_string_lossy()) {
                continue;
            }
            references.push(file_reference(&entry.path(), entry.metadata().ok(), config));
        }
    }
    Ok(references)
}

fn file_reference(
    path: &Path,
    meta: Option<std::fs::Metadata>,
    config: &Arc<SourceConfig>,
) -> ImageRef {
    let (last_modified, byte_size) = match meta {
        Some(meta) => (epoch_millis(meta.modified().ok()), meta.len()),
        None => (0, 0),
    };
    ImageRef::new(
        path.to_string_lossy().into_owned(),
        Arc::clone(config),
        last_modified,
        byte_size,
    )
}

fn epoch_millis(time: Option<SystemTime>) -> i64 {
    time.and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
