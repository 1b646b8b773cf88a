//! Backend en mémoire pour les tests et les essais à blanc
//!
//! Collections et features dans des `HashMap` protégées par un `RwLock`
//! tokio. La recherche de proximité est un parcours complet avec distance
//! géodésique (Karney) calculée par `geo`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use geo::Point;
use geofeature::{CollectionId, FeatureId};
use tokio::sync::RwLock;

use super::model::{Collection, CollectionSummary, Feature};
use super::{DistanceMatch, StoreBackend};
use crate::error::{Result, StoreError};
use crate::query::geodesic_distance_m;

struct StoredFeature {
    seq: u64,
    feature: Feature,
}

#[derive(Default)]
struct State {
    collections: HashMap<CollectionId, (u64, Collection)>,
    features: HashMap<FeatureId, StoredFeature>,
    next_seq: u64,
}

impl State {
    fn next(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Backend en mémoire
#[derive(Default)]
pub struct MemoryBackend {
    state: RwLock<State>,
    offline: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simule un datastore injoignable: toutes les opérations échouent
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(anyhow::anyhow!(
                "memory backend is offline"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn ensure_schema(&self) -> Result<()> {
        self.check_online()
    }

    async fn insert_collection(&self, collection: &Collection) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.write().await;
        let seq = state.next();
        state
            .collections
            .insert(collection.id, (seq, collection.clone()));
        Ok(())
    }

    async fn get_collection(&self, id: CollectionId) -> Result<Option<Collection>> {
        self.check_online()?;
        let state = self.state.read().await;
        Ok(state.collections.get(&id).map(|(_, c)| c.clone()))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        self.check_online()?;
        let state = self.state.read().await;

        let mut counts: HashMap<CollectionId, u64> = HashMap::new();
        for stored in state.features.values() {
            *counts.entry(stored.feature.collection_id).or_default() += 1;
        }

        let mut collections: Vec<_> = state.collections.values().collect();
        collections.sort_by_key(|(seq, _)| *seq);

        Ok(collections
            .into_iter()
            .map(|(_, c)| CollectionSummary {
                collection: c.clone(),
                feature_count: counts.get(&c.id).copied().unwrap_or(0),
            })
            .collect())
    }

    async fn update_collection(&self, collection: &Collection) -> Result<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        match state.collections.get_mut(&collection.id) {
            Some((_, existing)) => {
                *existing = collection.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_collection(&self, id: CollectionId) -> Result<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        if state.collections.remove(&id).is_none() {
            return Ok(false);
        }
        state.features.retain(|_, stored| stored.feature.collection_id != id);
        Ok(true)
    }

    async fn insert_features(&self, features: &[Feature]) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.write().await;

        // Vérification complète avant toute écriture
        if let Some(missing) = features
            .iter()
            .find(|f| !state.collections.contains_key(&f.collection_id))
        {
            return Err(StoreError::collection_not_found(missing.collection_id));
        }

        for feature in features {
            let seq = state.next();
            state.features.insert(
                feature.id,
                StoredFeature {
                    seq,
                    feature: feature.clone(),
                },
            );
        }
        Ok(())
    }

    async fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        self.check_online()?;
        let state = self.state.read().await;
        Ok(state.features.get(&id).map(|s| s.feature.clone()))
    }

    async fn list_features(&self, collection_id: CollectionId) -> Result<Vec<Feature>> {
        self.check_online()?;
        let state = self.state.read().await;

        let mut stored: Vec<_> = state
            .features
            .values()
            .filter(|s| s.feature.collection_id == collection_id)
            .collect();
        stored.sort_by_key(|s| s.seq);

        Ok(stored.into_iter().map(|s| s.feature.clone()).collect())
    }

    async fn count_features(&self, collection_id: CollectionId) -> Result<u64> {
        self.check_online()?;
        let state = self.state.read().await;
        Ok(state
            .features
            .values()
            .filter(|s| s.feature.collection_id == collection_id)
            .count() as u64)
    }

    async fn update_feature(&self, feature: &Feature) -> Result<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        match state.features.get_mut(&feature.id) {
            Some(stored) => {
                stored.feature = feature.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_feature(&self, id: FeatureId) -> Result<bool> {
        self.check_online()?;
        let mut state = self.state.write().await;
        Ok(state.features.remove(&id).is_some())
    }

    async fn within_distance(
        &self,
        center: Point,
        radius_m: f64,
        collection_id: Option<CollectionId>,
    ) -> Result<Vec<DistanceMatch>> {
        self.check_online()?;
        let state = self.state.read().await;

        let mut matches: Vec<DistanceMatch> = state
            .features
            .values()
            .filter(|s| collection_id.map_or(true, |id| s.feature.collection_id == id))
            .filter_map(|s| {
                let distance_m = geodesic_distance_m(s.feature.geometry(), center);
                (distance_m <= radius_m).then(|| DistanceMatch {
                    feature: s.feature.clone(),
                    distance_m,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.feature.id.cmp(&b.feature.id))
        });
        Ok(matches)
    }
}
