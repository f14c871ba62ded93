//! Gestion des erreurs du pipeline de récupération

use thiserror::Error;

/// Type Result personnalisé pour pmopixfetch
pub type Result<T> = std::result::Result<T, FetchError>;

/// Erreurs internes du pipeline.
///
/// Elles ne franchissent jamais la frontière d'affichage :
/// [`crate::Fetcher::materialize`] les journalise et les convertit en
/// absence d'artefact.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Erreur du backend de stockage (connexion, authentification, E/S distante)
    #[error("Source error: {0}")]
    Source(#[from] pmopixsource::SourceError),

    /// Le téléchargement a produit un fichier vide
    #[error("Empty download for {0}")]
    EmptyDownload(String),

    /// Les octets téléchargés ne forment pas une image décodable
    #[error("Decode failed: {0}")]
    Decode(String),

    /// Erreur du décodeur/encodeur d'images
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Erreur d'entrée/sortie locale
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur du magasin d'artefacts
    #[error("Cache error: {0}")]
    Cache(String),
}
