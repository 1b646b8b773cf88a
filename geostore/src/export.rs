//! Export d'une collection en GeoJSON

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use geofeature::CollectionId;
use tracing::info;

use crate::store::{Feature, SpatialStore};

/// Exporte toutes les features d'une collection dans un fichier GeoJSON
///
/// Retourne le nombre de features écrites.
pub async fn export_collection(
    store: &SpatialStore,
    collection_id: CollectionId,
    output_path: &Path,
) -> Result<usize> {
    let collection = store
        .get_collection_with_features(collection_id)
        .await
        .context("Failed to load collection")?;

    let mut buf = Vec::with_capacity(collection.features.len() * 256);
    write_feature_collection(&mut buf, &collection.features)?;

    tokio::fs::write(output_path, buf)
        .await
        .with_context(|| format!("Failed to write file: {}", output_path.display()))?;

    info!(
        collection = %collection_id,
        features = collection.features.len(),
        path = %output_path.display(),
        "Collection exported"
    );
    Ok(collection.features.len())
}

/// Écrit une FeatureCollection GeoJSON
pub fn write_feature_collection<W: Write>(writer: &mut W, features: &[Feature]) -> Result<()> {
    write!(writer, r#"{{"type":"FeatureCollection","features":["#)?;
    for (i, feature) in features.iter().enumerate() {
        if i > 0 {
            write!(writer, ",")?;
        }
        write_feature(writer, feature)?;
    }
    write!(writer, "]}}")?;
    writer.flush()?;
    Ok(())
}

/// Écrit une feature GeoJSON
fn write_feature<W: Write>(writer: &mut W, feature: &Feature) -> Result<()> {
    write!(writer, r#"{{"type":"Feature","id":"{}","#, feature.id)?;

    // Sérialisation de la géométrie elle-même: les ordonnées Z/M sont conservées
    write!(writer, r#""geometry":"#)?;
    serde_json::to_writer(&mut *writer, feature.geometry())
        .with_context(|| format!("Failed to encode geometry of feature {}", feature.id))?;

    write!(writer, r#","properties":"#)?;
    serde_json::to_writer(&mut *writer, &feature.properties)?;

    if let Some(bounds) = &feature.bounds {
        write!(writer, r#","bbox":"#)?;
        serde_json::to_writer(&mut *writer, bounds)?;
    }

    write!(writer, "}}")?;
    Ok(())
}
