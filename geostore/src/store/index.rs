//! Représentation indexée d'une géométrie
//!
//! Unique point de dérivation de la colonne spatiale: création simple,
//! création en masse et mise à jour passent toutes par [`SpatialIndex::derive`].

use geofeature::{Geometry, ValidationError};
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;
use tracing::trace;

/// SRID de référence (WGS84 longitude/latitude)
pub const SRID: u32 = 4326;

/// Géométrie encodée pour la colonne `geography` (EWKT)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialIndex {
    ewkt: String,
}

impl SpatialIndex {
    /// Dérive la représentation indexée depuis la géométrie de référence
    ///
    /// L'index est planaire: les ordonnées Z/M restent dans la géométrie
    /// de référence.
    pub fn derive(geometry: &Geometry) -> Result<Self, ValidationError> {
        if geometry.has_extra_ordinates() {
            trace!(kind = %geometry.kind(), "Extra ordinates left out of the index");
        }

        let mut wkt_buf = Vec::with_capacity(128);
        {
            let mut writer = WktWriter::new(&mut wkt_buf);
            geometry
                .to_geo()
                .process_geom(&mut writer)
                .map_err(|e| ValidationError::invalid(format!("WKT encoding failed: {}", e)))?;
        }

        let wkt = String::from_utf8_lossy(&wkt_buf);
        Ok(Self {
            ewkt: format!("SRID={};{}", SRID, wkt),
        })
    }

    /// Texte EWKT (`SRID=4326;...`)
    pub fn ewkt(&self) -> &str {
        &self.ewkt
    }
}
