//! Magasin d'artefacts sur disque avec éviction LRU
//!
//! Le magasin maintient un index en mémoire (empreinte -> taille, dernier
//! accès) qui reflète exactement le contenu du répertoire de cache : le
//! total courant est en permanence égal à la somme des tailles indexées.
//! L'index et le total sont protégés par un unique `RwLock` : les lectures
//! (`has`) s'entrelacent librement, toutes les mutations sont exclusives.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Budget par défaut du cache : 1 GiB
pub const DEFAULT_BUDGET_BYTES: u64 = 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    size: u64,
    last_access: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    initialized: bool,
    entries: HashMap<String, IndexEntry>,
    total_bytes: u64,
    clock: u64,
}

impl StoreState {
    fn bump(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Insère ou remplace une entrée en maintenant le total courant.
    fn insert(&mut self, key: &str, size: u64) {
        if let Some(previous) = self.entries.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(previous.size);
        }
        let last_access = self.bump();
        self.entries.insert(key.to_string(), IndexEntry { size, last_access });
        self.total_bytes += size;
    }

    fn forget(&mut self, key: &str) -> Option<IndexEntry> {
        let removed = self.entries.remove(key);
        if let Some(entry) = removed {
            self.total_bytes = self.total_bytes.saturating_sub(entry.size);
        }
        removed
    }
}

/// Magasin de blobs adressé par empreinte, borné en octets.
///
/// Conçu pour être construit une fois au démarrage et partagé derrière un
/// `Arc` entre le pipeline, le scanner et le buffer de préchargement.
pub struct CacheStore {
    dir: PathBuf,
    budget: u64,
    state: Arc<RwLock<StoreState>>,
}

impl CacheStore {
    /// Crée un magasin dans `dir` avec un budget en octets.
    ///
    /// Le répertoire est créé s'il n'existe pas. L'index n'est pas
    /// construit ici : il est reconstruit paresseusement au premier accès.
    pub fn new(dir: impl AsRef<Path>, budget: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        Ok(Self {
            dir,
            budget,
            state: Arc::new(RwLock::new(StoreState::default())),
        })
    }

    /// Retourne le répertoire du cache
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Retourne le budget configuré en octets
    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Emplacement déterministe de l'artefact pour `key`, qu'il existe ou non.
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Indique si un artefact existe pour `key`.
    ///
    /// Un hit disque non indexé (fichier déposé par un processus précédent)
    /// ré-alimente l'index et le total courant au passage.
    pub async fn has(&self, key: &str) -> bool {
        self.ensure_initialized().await;

        {
            let state = self.state.read().await;
            if state.entries.contains_key(key) {
                return true;
            }
        }

        let size = match std::fs::metadata(self.path(key)) {
            Ok(meta) if meta.is_file() => meta.len(),
            _ => return false,
        };

        let mut state = self.state.write().await;
        if !state.entries.contains_key(key) {
            state.insert(key, size);
        }
        true
    }

    /// Rafraîchit la position LRU d'une entrée.
    pub async fn touch(&self, key: &str) {
        self.ensure_initialized().await;
        let mut state = self.state.write().await;
        let tick = state.bump();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_access = tick;
        }
    }

    /// Copie un flux d'octets vers un fichier temporaire puis le commite.
    ///
    /// Aucun fichier partiel n'est jamais visible à l'emplacement final :
    /// l'écriture se fait dans `{key}.tmp`, le commit passe par
    /// [`CacheStore::put_from_file`]. En cas d'échec d'E/S le temporaire
    /// est supprimé et l'erreur est remontée.
    pub async fn put_from_stream<R>(&self, key: &str, reader: &mut R) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.ensure_initialized().await;
        let temp = self.dir.join(format!("{key}.tmp"));

        let staged = async {
            let mut file = tokio::fs::File::create(&temp).await?;
            tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            Ok::<_, std::io::Error>(())
        }
        .await;

        if let Err(err) = staged {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(err).with_context(|| format!("failed to stage stream for {key}"));
        }

        self.put_from_file(key, &temp).await
    }

    /// Commite un fichier temporaire déjà matérialisé sous `key`.
    ///
    /// Le commit remplace l'éventuel artefact précédent (sa taille est
    /// soustraite du total) et déclenche une éviction en tâche de fond si
    /// le total dépasse le budget. Le renommage est atomique; si le
    /// système de fichiers le refuse (volumes distincts), le repli
    /// copie-puis-remplace s'exécute sous le verrou exclusif du magasin.
    pub async fn put_from_file(&self, key: &str, temp: &Path) -> Result<PathBuf> {
        self.ensure_initialized().await;
        let target = self.path(key);

        let over_budget;
        {
            let mut state = self.state.write().await;

            if let Err(rename_err) = std::fs::rename(temp, &target) {
                debug!("Rename into cache failed for {}: {}", key, rename_err);
                if let Err(copy_err) = std::fs::copy(temp, &target) {
                    let _ = std::fs::remove_file(temp);
                    return Err(copy_err)
                        .with_context(|| format!("failed to commit artifact for {key}"));
                }
                let _ = std::fs::remove_file(temp);
            }

            let size = std::fs::metadata(&target)
                .with_context(|| format!("committed artifact vanished for {key}"))?
                .len();
            state.insert(key, size);
            over_budget = state.total_bytes > self.budget;
        }

        if over_budget {
            self.spawn_trim();
        }

        Ok(target)
    }

    /// Supprime une entrée et son fichier (absence tolérée).
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.ensure_initialized().await;
        let mut state = self.state.write().await;
        state.forget(key);
        match std::fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to delete artifact for {key}")),
        }
    }

    /// Supprime tous les artefacts indexés et remet l'index à zéro.
    ///
    /// Les fichiers `*.tmp` éventuels ne sont pas touchés : ils
    /// appartiennent aux téléchargements en cours.
    pub async fn purge(&self) -> Result<()> {
        self.ensure_initialized().await;
        let mut state = self.state.write().await;
        for key in state.entries.keys() {
            let path = self.dir.join(key);
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!("Cannot purge {}: {}", path.display(), err);
                }
            }
        }
        state.entries.clear();
        state.total_bytes = 0;
        Ok(())
    }

    /// Applique la politique d'éviction jusqu'à repasser sous le budget.
    ///
    /// Les entrées sont parcourues de la moins récemment utilisée à la
    /// plus récente. Un fichier déjà absent compte comme supprimé; un
    /// fichier qui refuse la suppression et existe toujours reste indexé
    /// pour ne pas sous-compter le total.
    pub async fn trim(&self) {
        self.ensure_initialized().await;
        trim_to_budget(&self.state, &self.dir, self.budget).await;
    }

    /// Nombre d'entrées indexées
    pub async fn len(&self) -> usize {
        self.ensure_initialized().await;
        self.state.read().await.entries.len()
    }

    /// Total courant en octets (somme des tailles indexées)
    pub async fn total_bytes(&self) -> u64 {
        self.ensure_initialized().await;
        self.state.read().await.total_bytes
    }

    fn spawn_trim(&self) {
        let state = Arc::clone(&self.state);
        let dir = self.dir.clone();
        let budget = self.budget;
        tokio::spawn(async move {
            trim_to_budget(&state, &dir, budget).await;
        });
    }

    /// Reconstruit l'index depuis le répertoire, une seule fois.
    async fn ensure_initialized(&self) {
        {
            if self.state.read().await.initialized {
                return;
            }
        }

        let mut state = self.state.write().await;
        if state.initialized {
            return;
        }

        match list_artifacts(&self.dir) {
            Ok(mut found) => {
                found.sort_by_key(|(_, _, mtime)| *mtime);
                for (name, size, _) in found {
                    let last_access = state.bump();
                    state.entries.insert(name, IndexEntry { size, last_access });
                    state.total_bytes += size;
                }
                debug!(
                    "Cache index rebuilt: {} entries, {} bytes",
                    state.entries.len(),
                    state.total_bytes
                );
            }
            Err(err) => {
                warn!("Error rebuilding cache index from {}: {}", self.dir.display(), err);
            }
        }
        state.initialized = true;
    }
}

/// Liste les artefacts commités du répertoire (fichiers hors `*.tmp`).
fn list_artifacts(dir: &Path) -> std::io::Result<Vec<(String, u64, SystemTime)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(_) => continue,
        };
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.ends_with(".tmp") {
            continue;
        }
        let meta = match entry.metadata() {
            Ok(meta) if meta.is_file() => meta,
            _ => continue,
        };
        let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((name, meta.len(), mtime));
    }
    Ok(found)
}

async fn trim_to_budget(state: &RwLock<StoreState>, dir: &Path, budget: u64) {
    let mut state = state.write().await;
    if state.total_bytes <= budget {
        return;
    }
    let before = state.total_bytes;

    let mut order: Vec<(String, u64)> = state
        .entries
        .iter()
        .map(|(key, entry)| (key.clone(), entry.last_access))
        .collect();
    order.sort_by_key(|(_, last_access)| *last_access);

    for (key, _) in order {
        if state.total_bytes <= budget {
            break;
        }
        let path = dir.join(&key);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                state.forget(&key);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                state.forget(&key);
            }
            Err(err) => {
                if path.exists() {
                    warn!("Cannot evict {}: {}", key, err);
                } else {
                    state.forget(&key);
                }
            }
        }
    }

    info!(
        "LRU eviction: {} -> {} bytes (budget {})",
        before, state.total_bytes, budget
    );
}
