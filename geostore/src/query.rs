//! Recherche de proximité géodésique
//!
//! Une feature est retournée si sa distance géodésique (ellipsoïde WGS84)
//! au centre est inférieure ou égale au rayon. Aucun résultat n'est pas une
//! erreur: seule une requête mal formée échoue.

use geo::{Closest, GeodesicDistance, HaversineClosestPoint, Intersects, Point};
use geofeature::{CollectionId, Geometry, Planar};
use serde::Deserialize;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::store::{DistanceMatch, Feature, SpatialStore};

/// Rayon par défaut (km)
pub const DEFAULT_RADIUS_KM: f64 = 100.0;

/// Requête "à moins de r km de (lat, lng)"
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RadiusQuery {
    pub latitude: f64,
    pub longitude: f64,
    /// Rayon en kilomètres (`None` = [`DEFAULT_RADIUS_KM`])
    #[serde(default)]
    pub radius_km: Option<f64>,
    /// Restreint la recherche à une collection
    #[serde(default)]
    pub collection_id: Option<CollectionId>,
}

impl RadiusQuery {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_km: None,
            collection_id: None,
        }
    }

    pub fn radius_km(mut self, radius_km: f64) -> Self {
        self.radius_km = Some(radius_km);
        self
    }

    pub fn in_collection(mut self, collection_id: CollectionId) -> Self {
        self.collection_id = Some(collection_id);
        self
    }

    /// Rayon effectif en mètres
    pub fn radius_m(&self) -> f64 {
        self.radius_km.unwrap_or(DEFAULT_RADIUS_KM) * 1000.0
    }

    /// Centre de la recherche (x = longitude, y = latitude)
    pub fn center(&self) -> Point {
        Point::new(self.longitude, self.latitude)
    }

    /// Vérifie les bornes du centre et du rayon
    pub fn validate(&self) -> Result<()> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StoreError::InvalidQuery(format!(
                "latitude out of range: {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StoreError::InvalidQuery(format!(
                "longitude out of range: {}",
                self.longitude
            )));
        }
        if let Some(r) = self.radius_km {
            if !r.is_finite() || r < 0.0 {
                return Err(StoreError::InvalidQuery(format!("invalid radius: {} km", r)));
            }
        }
        Ok(())
    }
}

/// Distance géodésique (m) entre une géométrie et un point
///
/// Mesurée jusqu'au point le plus proche sur les segments (arc de grand
/// cercle), pas seulement jusqu'aux sommets; 0 si un polygone contient le
/// point.
pub fn geodesic_distance_m(geometry: &Geometry, center: Point) -> f64 {
    let shape = geometry.to_geo();
    let polygonal = matches!(
        geometry.planar(),
        Planar::Polygon(_) | Planar::MultiPolygon(_)
    );
    if polygonal && shape.intersects(&center) {
        return 0.0;
    }

    let nearest_vertex = geometry
        .vertices()
        .iter()
        .map(|vertex| vertex.geodesic_distance(&center))
        .fold(f64::INFINITY, f64::min);

    let nearest_on_segment = match shape.haversine_closest_point(&center) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => p.geodesic_distance(&center),
        Closest::Indeterminate => f64::INFINITY,
    };

    nearest_vertex.min(nearest_on_segment)
}

impl SpatialStore {
    /// Features à moins de `radius_km` du centre, plus proches d'abord
    pub async fn find_within_radius(&self, query: &RadiusQuery) -> Result<Vec<Feature>> {
        Ok(self
            .find_within_radius_with_distance(query)
            .await?
            .into_iter()
            .map(|m| m.feature)
            .collect())
    }

    /// Comme [`SpatialStore::find_within_radius`], avec la distance de chaque feature
    pub async fn find_within_radius_with_distance(
        &self,
        query: &RadiusQuery,
    ) -> Result<Vec<DistanceMatch>> {
        query.validate()?;

        let matches = self
            .backend()
            .within_distance(query.center(), query.radius_m(), query.collection_id)
            .await?;

        debug!(
            lat = query.latitude,
            lng = query.longitude,
            radius_m = query.radius_m(),
            matches = matches.len(),
            "Radius query"
        );
        Ok(matches)
    }
}
