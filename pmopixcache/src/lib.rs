//! # pmopixcache - Cache disque borné pour PMOWall
//!
//! Cette crate fournit le magasin d'artefacts du mur d'images : un cache
//! disque adressé par empreinte, borné en octets, avec éviction LRU.
//!
//! ## Vue d'ensemble
//!
//! - Fichiers plats stockés directement sous un répertoire dédié, nommés
//!   par leur empreinte (sans extension)
//! - Index en mémoire reconstruit paresseusement au premier accès en
//!   parcourant le répertoire (les fichiers `*.tmp` sont ignorés)
//! - Budget global en octets (1 GiB par défaut) appliqué par une éviction
//!   LRU lancée en tâche de fond après chaque commit dépassant le budget
//! - Commit atomique par renommage : un lecteur concurrent observe soit
//!   l'ancien artefact, soit le nouveau complètement écrit
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use pmopixcache::{fingerprint, CacheStore, DEFAULT_BUDGET_BYTES};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(CacheStore::new("./wall_cache", DEFAULT_BUDGET_BYTES)?);
//!     let key = fingerprint("https://example.com/a.jpg", 1700000000000, 52_318);
//!
//!     if store.has(&key).await {
//!         println!("artefact: {:?}", store.path(&key));
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Structure des fichiers
//!
//! ```text
//! wall_cache/
//! ├── 1a2b3c…e4f5                   # artefact commité
//! ├── 9f8e7d…0a1b_raw.tmp           # transitoire (pipeline, ignoré ici)
//! └── 9f8e7d…0a1b_processed.tmp     # transitoire (pipeline, ignoré ici)
//! ```

pub mod key;
pub mod store;

pub use key::fingerprint;
pub use store::{CacheStore, DEFAULT_BUDGET_BYTES};
