//! Façade du stockage spatial

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use geofeature::{CollectionId, FeatureId, FeatureInput};
use serde_json::Value;
use tracing::{debug, info};

use super::events::{NoopObserver, StoreEvent, StoreObserver};
use super::memory::MemoryBackend;
use super::model::{
    Collection, CollectionPatch, CollectionSummary, CollectionWithFeatures, Feature,
    FeatureDraft, NewCollection,
};
use super::StoreBackend;
use crate::error::{Result, StoreError};

/// Stockage spatial: opérations sur collections et features
#[derive(Clone)]
pub struct SpatialStore {
    backend: Arc<dyn StoreBackend>,
    observer: Arc<dyn StoreObserver>,
}

impl SpatialStore {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Stockage en mémoire (tests, essais à blanc)
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Injecte l'observateur notifié après chaque écriture
    pub fn with_observer(mut self, observer: Arc<dyn StoreObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn backend(&self) -> &dyn StoreBackend {
        self.backend.as_ref()
    }

    fn emit(&self, event: StoreEvent) {
        self.observer.on_event(&event);
    }

    /// Crée les tables si nécessaire
    pub async fn ensure_schema(&self) -> Result<()> {
        self.backend.ensure_schema().await
    }

    pub async fn create_collection(&self, new: NewCollection) -> Result<Collection> {
        let now = Utc::now();
        let collection = Collection {
            id: CollectionId::new(),
            name: new.name,
            description: new.description,
            payload: new.payload,
            created_at: now,
            updated_at: now,
        };

        self.backend.insert_collection(&collection).await?;
        info!(collection = %collection.id, name = %collection.name, "Collection created");
        self.emit(StoreEvent::CollectionCreated(collection.id));

        Ok(collection)
    }

    pub async fn get_collection(&self, id: CollectionId) -> Result<Collection> {
        self.backend
            .get_collection(id)
            .await?
            .ok_or_else(|| StoreError::collection_not_found(id))
    }

    /// Collection avec la liste complète de ses features
    pub async fn get_collection_with_features(
        &self,
        id: CollectionId,
    ) -> Result<CollectionWithFeatures> {
        let collection = self.get_collection(id).await?;
        let features = self.backend.list_features(id).await?;
        Ok(CollectionWithFeatures {
            collection,
            features,
        })
    }

    /// Toutes les collections avec leur nombre de features
    pub async fn list_collections(&self) -> Result<Vec<CollectionSummary>> {
        self.backend.list_collections().await
    }

    pub async fn update_collection(
        &self,
        id: CollectionId,
        patch: CollectionPatch,
    ) -> Result<Collection> {
        let mut collection = self.get_collection(id).await?;
        patch.apply(&mut collection);
        collection.updated_at = Utc::now();

        if !self.backend.update_collection(&collection).await? {
            return Err(StoreError::collection_not_found(id));
        }
        self.emit(StoreEvent::CollectionUpdated(id));

        Ok(collection)
    }

    /// Supprime une collection et toutes ses features
    ///
    /// Ne retourne pas de compteur: lire les features avant si besoin.
    pub async fn delete_collection(&self, id: CollectionId) -> Result<()> {
        if !self.backend.delete_collection(id).await? {
            return Err(StoreError::collection_not_found(id));
        }
        info!(collection = %id, "Collection deleted");
        self.emit(StoreEvent::CollectionDeleted(id));
        Ok(())
    }

    /// Valide la géométrie, dérive l'index, assigne un identifiant et persiste
    pub async fn create_feature(
        &self,
        collection_id: CollectionId,
        draft: FeatureDraft,
    ) -> Result<Feature> {
        let input = draft.into_input(collection_id)?;
        let mut created = self.bulk_create_features(vec![input]).await?;
        created
            .pop()
            .ok_or_else(|| StoreError::Unavailable(anyhow::anyhow!("insert returned no feature")))
    }

    /// Écriture multi-lignes d'entrées déjà validées, sans commit partiel
    pub async fn bulk_create_features(&self, inputs: Vec<FeatureInput>) -> Result<Vec<Feature>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let features = inputs
            .into_iter()
            .map(|input| Feature::from_input(FeatureId::new(), input, now))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        self.backend.insert_features(&features).await?;

        let mut per_collection: BTreeMap<CollectionId, usize> = BTreeMap::new();
        for feature in &features {
            *per_collection.entry(feature.collection_id).or_default() += 1;
        }
        for (collection_id, count) in per_collection {
            debug!(collection = %collection_id, count, "Features created");
            self.emit(StoreEvent::FeaturesCreated {
                collection_id,
                count,
            });
        }

        Ok(features)
    }

    pub async fn get_feature(&self, id: FeatureId) -> Result<Feature> {
        self.backend
            .get_feature(id)
            .await?
            .ok_or_else(|| StoreError::feature_not_found(id))
    }

    /// Features d'une collection (vide si la collection n'existe pas)
    pub async fn list_features(&self, collection_id: CollectionId) -> Result<Vec<Feature>> {
        self.backend.list_features(collection_id).await
    }

    pub async fn count_features(&self, collection_id: CollectionId) -> Result<u64> {
        self.backend.count_features(collection_id).await
    }

    /// Remplace type, propriétés, géométrie et bounds; réindexe
    ///
    /// Les champs absents du brouillon ne sont pas repris de la version
    /// précédente.
    pub async fn update_feature(&self, id: FeatureId, draft: FeatureDraft) -> Result<Feature> {
        let existing = self.get_feature(id).await?;
        let input = draft.into_input(existing.collection_id)?;

        let mut feature = Feature::from_input(id, input, Utc::now())?;
        feature.enabled = existing.enabled;
        feature.created_at = existing.created_at;

        if !self.backend.update_feature(&feature).await? {
            return Err(StoreError::feature_not_found(id));
        }
        self.emit(StoreEvent::FeatureUpdated(id));

        Ok(feature)
    }

    /// Active ou désactive une feature (approbation)
    pub async fn set_feature_enabled(&self, id: FeatureId, enabled: bool) -> Result<Feature> {
        let mut feature = self.get_feature(id).await?;
        feature.enabled = enabled;
        feature.updated_at = Utc::now();

        if !self.backend.update_feature(&feature).await? {
            return Err(StoreError::feature_not_found(id));
        }
        self.emit(StoreEvent::FeatureUpdated(id));

        Ok(feature)
    }

    pub async fn delete_feature(&self, id: FeatureId) -> Result<()> {
        if !self.backend.delete_feature(id).await? {
            return Err(StoreError::feature_not_found(id));
        }
        self.emit(StoreEvent::FeatureDeleted(id));
        Ok(())
    }

    /// Normalise un document et insère toutes ses features en un appel
    ///
    /// Un seul élément invalide fait échouer l'import entier.
    pub async fn import_from_document(
        &self,
        collection_id: CollectionId,
        document: &Value,
    ) -> Result<Vec<Feature>> {
        let has_type = document.get("type").is_some();
        let has_features = document.get("features").is_some();
        if !has_type && !has_features {
            return Err(StoreError::InvalidDocument(
                "document has neither a type nor a features list".to_string(),
            ));
        }

        let inputs = geofeature::normalize(document, collection_id)?.into_features()?;
        let features = self.bulk_create_features(inputs).await?;

        info!(
            collection = %collection_id,
            features = features.len(),
            "Document imported"
        );
        Ok(features)
    }
}
