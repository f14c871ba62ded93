//! Chargement des réglages YAML de PMOWall
//!
//! Chaque champ absent retombe sur sa valeur par défaut; un fichier absent
//! donne une configuration par défaut complète (aucune source).

use anyhow::{Context, Result};
use pmopixbuffer::{CACHED_PROBE_LIMIT, DEFAULT_WORKERS, MIN_BUFFER_SIZE};
use pmopixcache::DEFAULT_BUDGET_BYTES;
use pmopixsource::SourceConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub cache: CacheSettings,
    pub buffer: BufferSettings,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: String,
    pub budget_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: "./wall_cache".to_string(),
            budget_bytes: DEFAULT_BUDGET_BYTES,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BufferSettings {
    pub min_buffer: usize,
    pub probe_limit: usize,
    pub workers: usize,
    /// Cadence de la boucle d'affichage de démonstration
    pub interval_ms: u64,
}

impl Default for BufferSettings {
    fn default() -> Self {
        Self {
            min_buffer: MIN_BUFFER_SIZE,
            probe_limit: CACHED_PROBE_LIMIT,
            workers: DEFAULT_WORKERS,
            interval_ms: 5000,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings = serde_yaml::from_str(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmopixsource::SourceKind;

    #[test]
    fn defaults_apply_when_fields_are_missing() {
        let settings: Settings = serde_yaml::from_str("sources: []").unwrap();
        assert_eq!(settings.cache.budget_bytes, DEFAULT_BUDGET_BYTES);
        assert_eq!(settings.buffer.min_buffer, MIN_BUFFER_SIZE);
        assert_eq!(settings.buffer.workers, DEFAULT_WORKERS);
        assert!(settings.sources.is_empty());
    }

    #[test]
    fn full_settings_file_parses() {
        let yaml = r#"
cache:
  dir: /var/cache/pmowall
  budget_bytes: 536870912
buffer:
  min_buffer: 6
  workers: 3
sources:
  - kind: local
    path: /mnt/photos
  - kind: smb
    host: nas.local
    share: photos
    user: alice
    password: secret
    recursive: false
  - kind: webdav
    host: https://dav.example.com
    path: albums/2024
    user: bob
    password: hunter2
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.cache.dir, "/var/cache/pmowall");
        assert_eq!(settings.cache.budget_bytes, 536870912);
        assert_eq!(settings.buffer.min_buffer, 6);
        // Champ omis : retombe sur la valeur par défaut
        assert_eq!(settings.buffer.probe_limit, CACHED_PROBE_LIMIT);

        assert_eq!(settings.sources.len(), 3);
        assert_eq!(settings.sources[0].kind, SourceKind::Local);
        assert_eq!(settings.sources[1].kind, SourceKind::Smb);
        assert!(!settings.sources[1].recursive);
        assert_eq!(settings.sources[2].kind, SourceKind::Webdav);
        assert_eq!(settings.sources[2].path, "albums/2024");
    }
}
