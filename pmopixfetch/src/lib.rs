//! # pmopixfetch - Pipeline de récupération et transcodage pour PMOWall
//!
//! Cette crate transforme une référence d'image découverte par le scanner
//! en un artefact local petit, borné en mémoire et garanti décodable, en
//! utilisant le cache disque comme couche de mémoïsation.
//!
//! ## Machine à états par référence
//!
//! 1. Source locale : le locator est retourné tel quel (pas de cache, pas
//!    de transcodage)
//! 2. Sondage du cache : artefact présent et valide -> retour immédiat;
//!    artefact corrompu -> supprimé puis re-téléchargé
//! 3. Téléchargement du flux distant vers `{clé}_raw.tmp` (un fichier vide
//!    est un échec dur)
//! 4. Décodage sous-échantillonné : lecture des seules dimensions, facteur
//!    entier doublé jusqu'à tenir sous 1920 px, décodage réduit sans alpha
//! 5. Ré-encodage WebP qualité 80 vers `{clé}_processed.tmp`, validation
//!    des bornes
//! 6. Commit dans le magasin; tout échec nettoie les deux temporaires et
//!    se traduit par une absence, jamais par une exception remontée à
//!    l'affichage
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmopixcache::{CacheStore, DEFAULT_BUDGET_BYTES};
//! use pmopixfetch::Fetcher;
//! use std::sync::Arc;
//!
//! # async fn demo(reference: pmopixsource::ImageRef) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CacheStore::new("./wall_cache", DEFAULT_BUDGET_BYTES)?);
//! let fetcher = Fetcher::new(store);
//!
//! if let Some(artifact) = fetcher.materialize(&reference).await {
//!     println!("prêt à afficher : {artifact:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod pipeline;
pub mod transcode;

pub use error::{FetchError, Result};
pub use pipeline::Fetcher;
pub use transcode::{MAX_DIMENSION, WEBP_QUALITY};
