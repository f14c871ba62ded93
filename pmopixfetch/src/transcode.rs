//! Transcodage : sondage des dimensions, sous-échantillonnage entier et
//! ré-encodage WebP.
//!
//! Toutes les fonctions sont synchrones et pures vis-à-vis du runtime :
//! le pipeline les appelle depuis `spawn_blocking`.

use crate::error::{FetchError, Result};
use image::imageops::FilterType;
use image::ImageReader;
use std::path::Path;

/// Borne supérieure des deux dimensions d'un artefact
pub const MAX_DIMENSION: u32 = 1920;
/// Qualité WebP des artefacts (0-100)
pub const WEBP_QUALITY: f32 = 80.0;

/// Lit les seules dimensions d'une image, sans décoder les pixels.
///
/// Échoue fermé : bornes illisibles ou nulles -> erreur, jamais de
/// supposition.
pub fn read_dimensions(path: &Path) -> Result<(u32, u32)> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(FetchError::Decode(format!(
            "empty bounds for {}",
            path.display()
        )));
    }
    Ok((width, height))
}

/// Facteur entier de sous-échantillonnage : doublé jusqu'à ce que les deux
/// dimensions tiennent sous `max_dimension`, borné à 1 (ne grossit jamais).
pub fn sample_factor(width: u32, height: u32, max_dimension: u32) -> u32 {
    let mut factor = 1u32;
    while width / factor > max_dimension || height / factor > max_dimension {
        factor *= 2;
    }
    factor
}

/// Décode `raw` au facteur calculé, convertit en RGB 8 bits sans alpha et
/// encode le résultat en WebP avec perte dans `processed`.
///
/// Le buffer pleine résolution vit uniquement dans la portée de cette
/// fonction et est libéré sur chaque chemin de sortie.
pub fn transcode_to_webp(
    raw: &Path,
    processed: &Path,
    max_dimension: u32,
    quality: f32,
) -> Result<()> {
    let (width, height) = read_dimensions(raw)?;
    let factor = sample_factor(width, height, max_dimension);

    let decoded = ImageReader::open(raw)?.with_guessed_format()?.decode()?;
    let reduced = if factor > 1 {
        decoded.resize_exact(
            (width / factor).max(1),
            (height / factor).max(1),
            FilterType::Triangle,
        )
    } else {
        decoded
    };
    let rgb = reduced.into_rgb8();

    let encoded = webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height()).encode(quality);
    std::fs::write(processed, &*encoded)?;
    Ok(())
}

/// Valide un artefact (en cache ou fraîchement produit) : fichier non vide
/// dont les bornes se décodent et sont strictement positives.
pub fn validate_artifact(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {}
        _ => return false,
    }
    match ImageReader::open(path).and_then(|reader| reader.with_guessed_format()) {
        Ok(reader) => matches!(reader.into_dimensions(), Ok((w, h)) if w > 0 && h > 0),
        Err(_) => false,
    }
}
