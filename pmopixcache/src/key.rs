//! Dérivation des empreintes du cache
//!
//! Une seule forme canonique : l'empreinte couvre le locator et les
//! attributs du fichier distant, si bien que deux scans du même objet
//! physique retombent sur la même entrée de cache, quelle que soit la
//! configuration de source qui l'a découvert.

use sha2::{Digest, Sha256};

/// Calcule l'empreinte d'une référence d'image.
///
/// SHA-256 hexadécimal de `"{locator}|{last_modified}|{byte_size}"`.
/// Déterministe : deux références identiques champ à champ produisent la
/// même clé; changer un seul champ change la clé.
///
/// # Arguments
///
/// * `locator` - Chemin absolu ou URL pleinement qualifiée
/// * `last_modified` - Date de modification en millisecondes epoch (0 si inconnue)
/// * `byte_size` - Taille en octets (0 si inconnue)
pub fn fingerprint(locator: &str, last_modified: i64, byte_size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{locator}|{last_modified}|{byte_size}").as_bytes());
    hex::encode(hasher.finalize())
}
