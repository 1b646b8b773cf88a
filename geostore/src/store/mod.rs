//! Stockage spatial des collections et features
//!
//! [`SpatialStore`] porte toute la dérivation (identifiants, horodatage,
//! représentation indexée) et délègue la persistance à un [`StoreBackend`]:
//! PostGIS en production, mémoire pour les tests et les essais à blanc.

pub mod events;
pub mod index;
pub mod memory;
pub mod model;
pub mod pool;
pub mod postgres;
mod spatial;

pub use events::{NoopObserver, StoreEvent, StoreObserver, TracingObserver};
pub use index::{SpatialIndex, SRID};
pub use memory::MemoryBackend;
pub use model::{
    Collection, CollectionPatch, CollectionSummary, CollectionWithFeatures, Feature,
    FeatureDraft, NewCollection,
};
pub use postgres::PgBackend;
pub use spatial::SpatialStore;

use async_trait::async_trait;
use geo::Point;
use geofeature::{CollectionId, FeatureId};

use crate::error::Result;

/// Feature trouvée par une recherche de proximité
#[derive(Debug, Clone, serde::Serialize)]
pub struct DistanceMatch {
    pub feature: Feature,
    /// Distance géodésique en mètres
    pub distance_m: f64,
}

/// Persistance des collections et features
///
/// Chaque opération est atomique sur ses propres enregistrements. Les
/// opérations `update_*` / `delete_*` retournent `false` si l'enregistrement
/// n'existe pas.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Crée les tables et index si nécessaire
    async fn ensure_schema(&self) -> Result<()>;

    async fn insert_collection(&self, collection: &Collection) -> Result<()>;

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>>;

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>>;

    async fn update_collection(&self, collection: &Collection) -> Result<bool>;

    /// Supprime la collection et, dans la même opération, toutes ses features
    async fn delete_collection(&self, id: CollectionId) -> Result<bool>;

    /// Écriture multi-lignes en un seul appel: tout ou rien
    ///
    /// Échoue avec `NotFound` si une collection référencée n'existe pas.
    async fn insert_features(&self, features: &[Feature]) -> Result<()>;

    async fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>>;

    async fn list_features(&self, collection_id: CollectionId) -> Result<Vec<Feature>>;

    async fn count_features(&self, collection_id: CollectionId) -> Result<u64>;

    async fn update_feature(&self, feature: &Feature) -> Result<bool>;

    async fn delete_feature(&self, id: FeatureId) -> Result<bool>;

    /// Features à une distance géodésique <= `radius_m` du centre,
    /// triées par distance croissante puis par identifiant
    async fn within_distance(
        &self,
        center: Point,
        radius_m: f64,
        collection_id: Option<CollectionId>,
    ) -> Result<Vec<DistanceMatch>>;
}
