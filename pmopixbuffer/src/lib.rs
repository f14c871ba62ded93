//! # pmopixbuffer - Buffer de préchargement pour PMOWall
//!
//! Cette crate maintient une petite réserve tournante de références déjà
//! matérialisées pour que la couche d'affichage n'attende presque jamais le
//! réseau.
//!
//! ## Fonctionnement
//!
//! Des workers en tâche de fond tirent des références au hasard (uniforme,
//! avec remise) dans la liste courante tant que la file est sous son seuil
//! minimal, les passent au pipeline de récupération, puis poussent la
//! *référence* (pas l'artefact) dans la file. Un échec de matérialisation
//! déclenche une courte pause avant un nouveau tirage; une file pleine, une
//! pause plus longue.
//!
//! La consommation ne bloque jamais : [`Prefetcher::next`] dépile la file
//! et, à défaut, tire une référence au hasard dans la liste.
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmopixbuffer::Prefetcher;
//! use pmopixcache::{CacheStore, DEFAULT_BUDGET_BYTES};
//! use pmopixfetch::Fetcher;
//! use pmopixsource::SourceConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(CacheStore::new("./wall_cache", DEFAULT_BUDGET_BYTES)?);
//!     let fetcher = Arc::new(Fetcher::new(store));
//!     let prefetcher = Prefetcher::new(fetcher);
//!
//!     let sources = vec![SourceConfig::local("/mnt/photos")];
//!     prefetcher.start_session(&sources).await;
//!     prefetcher.spawn_workers(2);
//!
//!     if let Some(reference) = prefetcher.next().await {
//!         println!("à afficher : {}", reference.locator);
//!     }
//!     Ok(())
//! }
//! ```

use pmopixcache::fingerprint;
use pmopixfetch::Fetcher;
use pmopixsource::{scan_all, ImageRef, SourceConfig};
use rand::seq::{IndexedRandom, SliceRandom};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Taille minimale visée pour la file de préchargement
pub const MIN_BUFFER_SIZE: usize = 10;
/// Nombre de tirages avant d'abandonner la recherche d'une référence en cache
pub const CACHED_PROBE_LIMIT: usize = 20;
/// Nombre de workers par défaut
pub const DEFAULT_WORKERS: usize = 2;

/// Pause après un échec de matérialisation
const RETRY_DELAY: Duration = Duration::from_millis(200);
/// Pause quand la file est au-dessus de son seuil
const IDLE_DELAY: Duration = Duration::from_secs(1);

/// Hook appelé après chaque préchargement réussi, typiquement pour
/// réchauffer le cache de décodage de la couche d'affichage.
pub type Warmer = Arc<dyn Fn(&ImageRef, &Path) + Send + Sync>;

struct BufferState {
    fetcher: Arc<Fetcher>,
    /// Liste courante, remplacée en bloc à chaque session
    references: RwLock<Arc<Vec<ImageRef>>>,
    queue: Mutex<VecDeque<ImageRef>>,
    min_buffer: usize,
    probe_limit: usize,
    warmer: Option<Warmer>,
    running: AtomicBool,
}

/// Réserve tournante de références affichables.
///
/// Conçu pour être partagé derrière un `Arc` entre la couche d'affichage
/// et les workers. Un redémarrage de session vide la file mais n'annule
/// pas les récupérations en cours : leurs résultats tardifs atterrissent
/// dans la nouvelle file, ce qui est sans danger puisque les références
/// sont des valeurs immuables.
pub struct Prefetcher {
    state: Arc<BufferState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Prefetcher {
    /// Crée un buffer avec les seuils par défaut et sans warmer.
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self::with_options(fetcher, MIN_BUFFER_SIZE, CACHED_PROBE_LIMIT, None)
    }

    /// Crée un buffer avec des seuils explicites et un warmer optionnel.
    ///
    /// # Arguments
    ///
    /// * `min_buffer` - Seuil sous lequel les workers rechargent la file
    /// * `probe_limit` - Tirages maximum de [`Prefetcher::random_cached`]
    /// * `warmer` - Hook appelé après chaque préchargement réussi
    pub fn with_options(
        fetcher: Arc<Fetcher>,
        min_buffer: usize,
        probe_limit: usize,
        warmer: Option<Warmer>,
    ) -> Self {
        Self {
            state: Arc::new(BufferState {
                fetcher,
                references: RwLock::new(Arc::new(Vec::new())),
                queue: Mutex::new(VecDeque::new()),
                min_buffer,
                probe_limit,
                warmer,
                running: AtomicBool::new(true),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Scanne toutes les sources, mélange le résultat et remplace la liste
    /// courante en bloc. La file est vidée; les workers déjà en vol ne
    /// sont pas annulés.
    ///
    /// Retourne le nombre de références découvertes.
    pub async fn start_session(&self, configs: &[SourceConfig]) -> usize {
        let mut references = scan_all(configs).await;
        {
            let mut rng = rand::rng();
            references.shuffle(&mut rng);
        }
        let count = references.len();
        self.set_references(references).await;
        info!("Session started with {} reference(s)", count);
        count
    }

    /// Remplace la liste de références et vide la file.
    pub async fn set_references(&self, references: Vec<ImageRef>) {
        *self.state.references.write().await = Arc::new(references);
        self.state.queue.lock().unwrap().clear();
    }

    /// Lance `count` workers de préchargement en tâche de fond.
    pub fn spawn_workers(&self, count: usize) {
        let mut workers = self.workers.lock().unwrap();
        for worker_id in 0..count {
            let state = Arc::clone(&self.state);
            workers.push(tokio::spawn(async move {
                worker_loop(state, worker_id).await;
            }));
        }
    }

    /// Prochaine référence à afficher.
    ///
    /// Dépile la file si possible, sinon tire au hasard dans la liste
    /// courante : l'affichage ne se bloque jamais, même quand le
    /// préchargement est en retard.
    pub async fn next(&self) -> Option<ImageRef> {
        if let Some(reference) = self.state.queue.lock().unwrap().pop_front() {
            return Some(reference);
        }
        let references = self.state.references.read().await.clone();
        let mut rng = rand::rng();
        references.choose(&mut rng).cloned()
    }

    /// Référence dont l'artefact est déjà en cache, si possible.
    ///
    /// Tire jusqu'à `probe_limit` références au hasard (avec remise) et
    /// retourne la première dont la clé touche le magasin; à défaut,
    /// retourne une référence arbitraire en dernier recours.
    pub async fn random_cached(&self) -> Option<ImageRef> {
        let references = self.state.references.read().await.clone();
        if references.is_empty() {
            return None;
        }
        let cache = self.state.fetcher.cache();
        for _ in 0..self.state.probe_limit {
            let picked = {
                let mut rng = rand::rng();
                references.choose(&mut rng).cloned()
            };
            let Some(reference) = picked else { break };
            let key = fingerprint(
                &reference.locator,
                reference.last_modified,
                reference.byte_size,
            );
            if cache.has(&key).await {
                return Some(reference);
            }
        }
        let mut rng = rand::rng();
        references.choose(&mut rng).cloned()
    }

    /// Liste courante de références
    pub async fn references(&self) -> Arc<Vec<ImageRef>> {
        self.state.references.read().await.clone()
    }

    /// Taille actuelle de la file
    pub fn queue_len(&self) -> usize {
        self.state.queue.lock().unwrap().len()
    }

    /// Arrête les workers. Idempotent.
    pub fn stop(&self) {
        self.state.running.store(false, Ordering::Relaxed);
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.drain(..) {
            worker.abort();
        }
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn worker_loop(state: Arc<BufferState>, worker_id: usize) {
    debug!("Prefetch worker {} started", worker_id);
    while state.running.load(Ordering::Relaxed) {
        let references = state.references.read().await.clone();
        let below_minimum = state.queue.lock().unwrap().len() < state.min_buffer;

        if references.is_empty() || !below_minimum {
            tokio::time::sleep(IDLE_DELAY).await;
            continue;
        }

        let picked = {
            let mut rng = rand::rng();
            references.choose(&mut rng).cloned()
        };
        let Some(reference) = picked else { continue };

        match state.fetcher.materialize(&reference).await {
            Some(artifact) => {
                if let Some(warmer) = &state.warmer {
                    warmer(&reference, &artifact);
                }
                state.queue.lock().unwrap().push_back(reference);
            }
            None => {
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
    debug!("Prefetch worker {} stopped", worker_id);
}
