//! Configuration de l'outil

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::{IngestOptions, DEFAULT_BATCH_SIZE};
use crate::query::DEFAULT_RADIUS_KM;

/// Réglages chargés depuis un fichier JSON (tous optionnels)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Éléments traités en parallèle par lot
    pub batch_size: usize,
    /// Pause entre deux lots (ms)
    pub chunk_delay_ms: u64,
    /// Délai maximal par élément (s)
    pub item_timeout_secs: u64,
    /// Rayon de recherche par défaut (km)
    pub default_radius_km: f64,
    /// Schéma PostgreSQL cible
    pub schema: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_delay_ms: 1000,
            item_timeout_secs: 30,
            default_radius_km: DEFAULT_RADIUS_KM,
            schema: "public".to_string(),
        }
    }
}

impl Settings {
    /// Charge les réglages depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Self =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        if !settings.default_radius_km.is_finite() || settings.default_radius_km < 0.0 {
            anyhow::bail!(
                "Invalid default_radius_km in {}: {}",
                path.display(),
                settings.default_radius_km
            );
        }
        Ok(settings)
    }

    /// Fichier si fourni, défauts sinon
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions::default()
            .batch_size(self.batch_size)
            .chunk_delay(Duration::from_millis(self.chunk_delay_ms))
            .item_timeout(Duration::from_secs(self.item_timeout_secs))
    }
}
