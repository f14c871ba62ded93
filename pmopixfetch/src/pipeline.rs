//! Pipeline de matérialisation d'une référence d'image

use crate::error::{FetchError, Result};
use crate::transcode;
use pmopixcache::{fingerprint, CacheStore};
use pmopixsource::{backend_for, ImageRef, SourceKind};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Transforme une référence en artefact local affichable.
///
/// Le fetcher est sans état propre : tout le partage passe par le magasin
/// injecté. Deux appels concurrents pour la même clé peuvent télécharger
/// chacun de leur côté; le second commit écrase silencieusement le premier,
/// ce qui est sans conséquence puisque le contenu d'une clé est stable.
pub struct Fetcher {
    cache: Arc<CacheStore>,
    max_dimension: u32,
    quality: f32,
}

impl Fetcher {
    /// Crée un fetcher avec les limites par défaut (1920 px, qualité 80).
    pub fn new(cache: Arc<CacheStore>) -> Self {
        Self::with_limits(cache, transcode::MAX_DIMENSION, transcode::WEBP_QUALITY)
    }

    /// Crée un fetcher avec des limites explicites.
    pub fn with_limits(cache: Arc<CacheStore>, max_dimension: u32, quality: f32) -> Self {
        Self {
            cache,
            max_dimension,
            quality,
        }
    }

    /// Retourne le magasin d'artefacts partagé
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    /// Matérialise une référence : chemin local prêt à afficher, ou absence.
    ///
    /// Les sources locales sont retournées telles quelles. Pour le reste,
    /// tout échec (connexion, décodage, commit) est journalisé et se
    /// traduit par `None` : l'appelant essaie autre chose, il ne traite
    /// jamais d'exception.
    pub async fn materialize(&self, reference: &ImageRef) -> Option<PathBuf> {
        if reference.source.kind == SourceKind::Local {
            return Some(PathBuf::from(&reference.locator));
        }
        match self.fetch_remote(reference).await {
            Ok(path) => Some(path),
            Err(err) => {
                debug!("No artifact for {}: {}", reference.locator, err);
                None
            }
        }
    }

    async fn fetch_remote(&self, reference: &ImageRef) -> Result<PathBuf> {
        let key = fingerprint(
            &reference.locator,
            reference.last_modified,
            reference.byte_size,
        );

        if self.cache.has(&key).await {
            let cached = self.cache.path(&key);
            if check_artifact(cached.clone()).await {
                self.cache.touch(&key).await;
                return Ok(cached);
            }
            warn!("Corrupt cached artifact for {}, refetching", reference.locator);
            if let Err(err) = self.cache.remove(&key).await {
                warn!("Cannot drop corrupt artifact {}: {}", key, err);
            }
        }

        let raw = self.cache.dir().join(format!("{key}_raw.tmp"));
        let processed = self.cache.dir().join(format!("{key}_processed.tmp"));
        let _guard = TempFiles::new(vec![raw.clone(), processed.clone()]);

        let backend = backend_for(&reference.source);
        let mut stream = backend.open_stream(reference).await?;
        let copied = {
            let mut file = tokio::fs::File::create(&raw).await?;
            let copied = tokio::io::copy(&mut stream, &mut file).await?;
            file.flush().await?;
            copied
        };
        if copied == 0 {
            return Err(FetchError::EmptyDownload(reference.locator.clone()));
        }

        let raw_path = raw.clone();
        let processed_path = processed.clone();
        let max_dimension = self.max_dimension;
        let quality = self.quality;
        tokio::task::spawn_blocking(move || {
            transcode::transcode_to_webp(&raw_path, &processed_path, max_dimension, quality)
        })
        .await
        .map_err(|err| FetchError::Decode(format!("transcode task failed: {err}")))??;

        if !check_artifact(processed.clone()).await {
            return Err(FetchError::Decode(format!(
                "invalid artifact produced for {}",
                reference.locator
            )));
        }

        let committed = self
            .cache
            .put_from_file(&key, &processed)
            .await
            .map_err(|err| FetchError::Cache(err.to_string()))?;
        Ok(committed)
    }
}

/// Validation des bornes hors du runtime (le décodage est synchrone).
async fn check_artifact(path: PathBuf) -> bool {
    tokio::task::spawn_blocking(move || transcode::validate_artifact(&path))
        .await
        .unwrap_or(false)
}

/// Supprime à la sortie du pipeline les temporaires encore présents,
/// quelle que soit la branche empruntée (succès compris : le fichier
/// commité a déjà été renommé hors de portée).
struct TempFiles(Vec<PathBuf>);

impl TempFiles {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            if let Err(err) = std::fs::remove_file(path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Leftover temp file {}: {}", path.display(), err);
                }
            }
        }
    }
}
