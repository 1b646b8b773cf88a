//! Import par lots
//!
//! Les éléments source sont découpés en lots de `batch_size`. Les éléments
//! d'un lot sont traités en parallèle; les lots s'enchaînent strictement,
//! séparés par une pause. Chaque élément est lu, normalisé, validé puis
//! inséré en un seul appel `bulk_create_features`; un échec reste local à
//! son élément.

pub mod report;
pub mod source;

pub use report::{BatchUploadOutcome, FailureKind, IngestStatus, ItemFailure, ItemOutcome};
pub use source::{collection_name_from_path, SourceItem};

use std::time::Duration;

use futures::stream::{self, StreamExt};
use geofeature::CollectionId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{IngestError, StoreError};
use crate::store::{Collection, NewCollection, SpatialStore};

/// Taille de lot par défaut
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Pause par défaut entre deux lots
pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_secs(1);

/// Délai maximal par élément
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Stratégie d'ordonnancement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IngestMode {
    /// Lots successifs séparés par une pause
    #[default]
    Chunked,
    /// File continue: au plus `batch_size` éléments en vol, sans pause
    Pipelined,
}

/// Options d'import
#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub chunk_delay: Duration,
    pub item_timeout: Duration,
    pub mode: IngestMode,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_delay: DEFAULT_CHUNK_DELAY,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
            mode: IngestMode::Chunked,
        }
    }
}

impl IngestOptions {
    /// Taille de lot (au minimum 1)
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn item_timeout(mut self, timeout: Duration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub fn mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

/// Contrôleur d'import par lots
#[derive(Clone)]
pub struct BatchIngestor {
    store: SpatialStore,
    options: IngestOptions,
    cancel: CancellationToken,
}

impl BatchIngestor {
    pub fn new(store: SpatialStore) -> Self {
        Self {
            store,
            options: IngestOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Jeton permettant d'interrompre l'import entre deux lots
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Importe les éléments dans une collection existante
    ///
    /// # Errors
    ///
    /// Uniquement si la collection n'existe pas ou si le datastore est
    /// injoignable avant tout traitement. Les échecs par élément sont
    /// dans le rapport.
    pub async fn ingest(
        &self,
        items: &[SourceItem],
        collection_id: CollectionId,
    ) -> Result<BatchUploadOutcome, IngestError> {
        match self.store.get_collection(collection_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(IngestError::CollectionNotFound(collection_id)),
            Err(e) => return Err(e.into()),
        }

        let start = Instant::now();
        let batch_size = self.options.effective_batch_size();

        info!(
            collection = %collection_id,
            items = items.len(),
            batch_size,
            mode = ?self.options.mode,
            "Starting batch ingest"
        );

        let outcomes = match self.options.mode {
            IngestMode::Chunked => self.run_chunked(items, collection_id, batch_size).await,
            IngestMode::Pipelined => self.run_pipelined(items, collection_id, batch_size).await,
        };

        let chunks = outcomes
            .iter()
            .filter(|o| !o.is_cancelled())
            .map(|o| o.chunk + 1)
            .max()
            .unwrap_or(0);

        let outcome = BatchUploadOutcome::from_items(outcomes, chunks, start.elapsed());

        info!(
            collection = %collection_id,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            features = outcome.total_features,
            cancelled = outcome.cancelled,
            "Batch ingest complete"
        );

        Ok(outcome)
    }

    /// Crée une collection puis y importe les éléments
    ///
    /// Sans nom explicite, le nom est dérivé du dossier du premier fichier.
    pub async fn ingest_into_new_collection(
        &self,
        items: &[SourceItem],
        name: Option<String>,
    ) -> Result<(Collection, BatchUploadOutcome), IngestError> {
        let name = name.unwrap_or_else(|| {
            items
                .iter()
                .find_map(|item| match item {
                    SourceItem::File(path) => Some(collection_name_from_path(path)),
                    _ => None,
                })
                .unwrap_or_else(|| collection_name_from_path(std::path::Path::new("")))
        });

        let collection = self
            .store
            .create_collection(NewCollection::named(name))
            .await?;
        let outcome = self.ingest(items, collection.id).await?;

        Ok((collection, outcome))
    }

    async fn run_chunked(
        &self,
        items: &[SourceItem],
        collection_id: CollectionId,
        batch_size: usize,
    ) -> Vec<ItemOutcome> {
        let total_chunks = items.len().div_ceil(batch_size);
        let mut outcomes = Vec::with_capacity(items.len());

        for (index, chunk) in items.chunks(batch_size).enumerate() {
            if index > 0 && !self.options.chunk_delay.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.options.chunk_delay) => {}
                }
            }

            if self.cancel.is_cancelled() {
                warn!(chunk = index + 1, total_chunks, "Ingest cancelled");
                outcomes.extend(cancelled_from(items, outcomes.len(), batch_size));
                break;
            }

            debug!(chunk = index + 1, total_chunks, items = chunk.len(), "Processing chunk");

            let results: Vec<ItemOutcome> = stream::iter(chunk)
                .map(|item| self.process_item(item, collection_id, index))
                .buffered(chunk.len())
                .collect()
                .await;

            let succeeded = results.iter().filter(|o| o.success).count();
            info!(
                chunk = index + 1,
                total_chunks,
                succeeded,
                failed = results.len() - succeeded,
                "Chunk complete"
            );

            outcomes.extend(results);
        }

        outcomes
    }

    async fn run_pipelined(
        &self,
        items: &[SourceItem],
        collection_id: CollectionId,
        batch_size: usize,
    ) -> Vec<ItemOutcome> {
        stream::iter(items.iter().enumerate())
            .map(move |(position, item)| async move {
                let chunk = position / batch_size;
                if self.cancel.is_cancelled() {
                    return cancelled(item, chunk);
                }
                self.process_item(item, collection_id, chunk).await
            })
            .buffered(batch_size)
            .collect()
            .await
    }

    /// Traite un élément; ne propage jamais d'erreur
    async fn process_item(
        &self,
        item: &SourceItem,
        collection_id: CollectionId,
        chunk: usize,
    ) -> ItemOutcome {
        let reference = item.reference();
        let work = async {
            let normalized = item.load(collection_id).await?;
            let inputs = normalized
                .into_features()
                .map_err(|e| ItemFailure::new(FailureKind::ValidationFailure, e.to_string()))?;
            let created = self
                .store
                .bulk_create_features(inputs)
                .await
                .map_err(store_failure)?;
            Ok::<_, ItemFailure>(created.len())
        };

        let failure = match tokio::time::timeout(self.options.item_timeout, work).await {
            Ok(Ok(count)) => {
                debug!(item = %reference, features = count, "Item ingested");
                return ItemOutcome::succeeded(reference, chunk, count);
            }
            Ok(Err(failure)) => failure,
            Err(_) => ItemFailure::new(
                FailureKind::Timeout,
                format!("timed out after {:?}", self.options.item_timeout),
            ),
        };

        warn!(item = %reference, kind = ?failure.kind, "Item failed: {}", failure.message);
        ItemOutcome::failed(reference, chunk, failure)
    }
}

fn store_failure(err: StoreError) -> ItemFailure {
    let kind = match err {
        StoreError::Validation(_) | StoreError::Element(_) => FailureKind::ValidationFailure,
        StoreError::Normalize(_) | StoreError::InvalidDocument(_) => FailureKind::MalformedPayload,
        _ => FailureKind::StoreUnavailable,
    };
    ItemFailure::new(kind, err.to_string())
}

fn cancelled(item: &SourceItem, chunk: usize) -> ItemOutcome {
    ItemOutcome::failed(
        item.reference(),
        chunk,
        ItemFailure::new(FailureKind::Cancelled, "ingest cancelled before this item started"),
    )
}

/// Éléments restants à partir de `from`, marqués annulés
fn cancelled_from(
    items: &[SourceItem],
    from: usize,
    batch_size: usize,
) -> impl Iterator<Item = ItemOutcome> + '_ {
    items
        .iter()
        .enumerate()
        .skip(from)
        .map(move |(position, item)| cancelled(item, position / batch_size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use geo::Point;
    use geofeature::FeatureId;
    use serde_json::json;

    use crate::error::Result as StoreResult;
    use crate::store::{CollectionSummary, DistanceMatch, Feature, StoreBackend};

    fn point_item(i: usize) -> SourceItem {
        SourceItem::record(
            format!("item-{i}"),
            json!([{"geometry": {"type": "Point", "coordinates": [i as f64 * 0.01, 0.0]}}]),
        )
    }

    async fn setup() -> (SpatialStore, CollectionId) {
        let store = SpatialStore::in_memory();
        let c = store
            .create_collection(NewCollection::named("ingest"))
            .await
            .unwrap();
        (store, c.id)
    }

    #[test]
    fn test_batch_size_minimum() {
        let options = IngestOptions::default().batch_size(0);
        assert_eq!(options.batch_size, 1);
        assert_eq!(IngestOptions::default().batch_size, 10);
    }

    #[tokio::test]
    async fn test_unknown_collection_is_call_error() {
        let store = SpatialStore::in_memory();
        let ingestor = BatchIngestor::new(store);
        let err = ingestor
            .ingest(&[point_item(0)], CollectionId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_item_is_malformed() {
        let (store, c) = setup().await;
        let ingestor = BatchIngestor::new(store.clone())
            .with_options(IngestOptions::default().chunk_delay(Duration::ZERO));

        let outcome = ingestor
            .ingest(&[SourceItem::record("empty", json!([]))], c)
            .await
            .unwrap();

        assert_eq!(outcome.failed, 1);
        let error = outcome.items[0].error.as_ref().unwrap();
        assert_eq!(error.kind, FailureKind::MalformedPayload);
    }

    #[tokio::test]
    async fn test_invalid_element_writes_nothing() {
        let (store, c) = setup().await;
        let ingestor = BatchIngestor::new(store.clone())
            .with_options(IngestOptions::default().chunk_delay(Duration::ZERO));

        let item = SourceItem::record(
            "mixed",
            json!([
                {"geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
                {"geometry": {"type": "Point", "coordinates": []}}
            ]),
        );
        let outcome = ingestor.ingest(&[item], c).await.unwrap();

        let error = outcome.items[0].error.as_ref().unwrap();
        assert_eq!(error.kind, FailureKind::ValidationFailure);
        assert!(error.message.contains("element 1"));
        assert_eq!(store.count_features(c).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_offline_store_is_call_error() {
        let backend = Arc::new(crate::store::MemoryBackend::new());
        let store = SpatialStore::new(backend.clone());
        let c = store
            .create_collection(NewCollection::named("c"))
            .await
            .unwrap();

        let ingestor = BatchIngestor::new(store.clone()).with_options(
            IngestOptions::default().chunk_delay(Duration::ZERO),
        );
        let items = vec![point_item(0)];
        let outcome = ingestor.ingest(&items, c.id).await.unwrap();
        assert_eq!(outcome.succeeded, 1);

        backend.set_offline(true);
        let err = ingestor.ingest(&items, c.id).await.unwrap_err();
        assert!(matches!(err, IngestError::Store(StoreError::Unavailable(_))));
    }

    #[test]
    fn test_store_failure_mapping() {
        let failure = store_failure(StoreError::collection_not_found(CollectionId::new()));
        assert_eq!(failure.kind, FailureKind::StoreUnavailable);
        let failure = store_failure(StoreError::Validation(
            geofeature::ValidationError::MissingType,
        ));
        assert_eq!(failure.kind, FailureKind::ValidationFailure);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_chunks() {
        let (store, c) = setup().await;
        let cancel = CancellationToken::new();
        let ingestor = BatchIngestor::new(store.clone())
            .with_options(
                IngestOptions::default()
                    .batch_size(2)
                    .chunk_delay(Duration::from_secs(60)),
            )
            .with_cancellation(cancel.clone());

        let items: Vec<_> = (0..6).map(point_item).collect();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            cancel.cancel();
        });

        let outcome = ingestor.ingest(&items, c).await.unwrap();
        canceller.await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.attempted, 2);
        assert_eq!(outcome.succeeded, 2);
        assert_eq!(outcome.chunks, 1);
        assert_eq!(outcome.items.len(), 6);
        assert!(outcome.items[2..].iter().all(|o| o.is_cancelled()));
        assert_eq!(outcome.items[5].chunk, 2);
        assert_eq!(store.count_features(c).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pipelined_mode() {
        let (store, c) = setup().await;
        let ingestor = BatchIngestor::new(store.clone()).with_options(
            IngestOptions::default()
                .batch_size(3)
                .mode(IngestMode::Pipelined),
        );

        let items: Vec<_> = (0..7).map(point_item).collect();
        let outcome = ingestor.ingest(&items, c).await.unwrap();

        assert_eq!(outcome.succeeded, 7);
        assert_eq!(outcome.chunks, 3);
        let refs: Vec<_> = outcome.items.iter().map(|o| o.reference.clone()).collect();
        let expected: Vec<_> = (0..7).map(|i| format!("item-{i}")).collect();
        assert_eq!(refs, expected);
    }

    #[tokio::test]
    async fn test_pipelined_cancelled_before_start() {
        let (store, c) = setup().await;
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ingestor = BatchIngestor::new(store)
            .with_options(IngestOptions::default().mode(IngestMode::Pipelined))
            .with_cancellation(cancel);

        let outcome = ingestor.ingest(&[point_item(0)], c).await.unwrap();
        assert!(outcome.cancelled);
        assert_eq!(outcome.attempted, 0);
        assert_eq!(outcome.chunks, 0);
    }

    /// Backend mémoire dont l'insertion dure 1 s et trace les éléments en vol
    #[derive(Default)]
    struct SlowBackend {
        inner: crate::store::MemoryBackend,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        events: Mutex<Vec<Event>>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Start(u64),
        End(u64),
    }

    /// Décompte l'insertion en vol, y compris quand le futur est abandonné
    struct InFlight<'a> {
        backend: &'a SlowBackend,
        index: u64,
    }

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.backend.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.backend.events.lock().unwrap().push(Event::End(self.index));
        }
    }

    #[async_trait]
    impl StoreBackend for SlowBackend {
        async fn ensure_schema(&self) -> StoreResult<()> {
            self.inner.ensure_schema().await
        }

        async fn insert_collection(&self, collection: &Collection) -> StoreResult<()> {
            self.inner.insert_collection(collection).await
        }

        async fn get_collection(&self, id: CollectionId) -> StoreResult<Option<Collection>> {
            self.inner.get_collection(id).await
        }

        async fn list_collections(&self) -> StoreResult<Vec<CollectionSummary>> {
            self.inner.list_collections().await
        }

        async fn update_collection(&self, collection: &Collection) -> StoreResult<bool> {
            self.inner.update_collection(collection).await
        }

        async fn delete_collection(&self, id: CollectionId) -> StoreResult<bool> {
            self.inner.delete_collection(id).await
        }

        async fn insert_features(&self, features: &[Feature]) -> StoreResult<()> {
            let first = &features[0].properties;
            let index = first.get("index").and_then(|v| v.as_u64()).unwrap_or(u64::MAX);
            let hang = first.contains_key("hang");

            self.events.lock().unwrap().push(Event::Start(index));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight {
                backend: self,
                index,
            };

            if hang {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.inner.insert_features(features).await
        }

        async fn get_feature(&self, id: FeatureId) -> StoreResult<Option<Feature>> {
            self.inner.get_feature(id).await
        }

        async fn list_features(&self, collection_id: CollectionId) -> StoreResult<Vec<Feature>> {
            self.inner.list_features(collection_id).await
        }

        async fn count_features(&self, collection_id: CollectionId) -> StoreResult<u64> {
            self.inner.count_features(collection_id).await
        }

        async fn update_feature(&self, feature: &Feature) -> StoreResult<bool> {
            self.inner.update_feature(feature).await
        }

        async fn delete_feature(&self, id: FeatureId) -> StoreResult<bool> {
            self.inner.delete_feature(id).await
        }

        async fn within_distance(
            &self,
            center: Point,
            radius_m: f64,
            collection_id: Option<CollectionId>,
        ) -> StoreResult<Vec<DistanceMatch>> {
            self.inner
                .within_distance(center, radius_m, collection_id)
                .await
        }
    }

    fn indexed_item(i: u64, hang: bool) -> SourceItem {
        let mut properties = json!({"index": i});
        if hang {
            properties["hang"] = json!(true);
        }
        SourceItem::record(
            format!("item-{i}"),
            json!([{
                "geometry": {"type": "Point", "coordinates": [i as f64 * 0.01, 0.0]},
                "properties": properties
            }]),
        )
    }

    async fn slow_setup() -> (Arc<SlowBackend>, SpatialStore, CollectionId) {
        let backend = Arc::new(SlowBackend::default());
        let store = SpatialStore::new(backend.clone());
        let c = store
            .create_collection(NewCollection::named("slow"))
            .await
            .unwrap();
        (backend, store, c.id)
    }

    #[tokio::test(start_paused = true)]
    async fn test_chunk_items_overlap_and_chunks_do_not() {
        let (backend, store, c) = slow_setup().await;
        let ingestor = BatchIngestor::new(store.clone()).with_options(
            IngestOptions::default()
                .batch_size(3)
                .chunk_delay(Duration::from_millis(500)),
        );

        let items: Vec<_> = (0..7).map(|i| indexed_item(i, false)).collect();
        let outcome = ingestor.ingest(&items, c).await.unwrap();

        assert_eq!(outcome.succeeded, 7);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 3);
        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);

        // Trois lots de 1 s en parallèle interne, plus deux pauses
        assert!(outcome.duration >= Duration::from_secs(4));
        assert!(outcome.duration < Duration::from_secs(7));

        // Le lot N+1 ne démarre qu'une fois le lot N entièrement terminé
        let events = backend.events.lock().unwrap().clone();
        for chunk in 0..2u64 {
            let last_end = events
                .iter()
                .rposition(|e| matches!(e, Event::End(i) if i / 3 == chunk))
                .unwrap();
            let next_start = events
                .iter()
                .position(|e| matches!(e, Event::Start(i) if i / 3 == chunk + 1))
                .unwrap();
            assert!(last_end < next_start, "chunk {} overlaps the next: {:?}", chunk, events);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_item_timeout_does_not_stop_chunk() {
        let (backend, store, c) = slow_setup().await;
        let ingestor = BatchIngestor::new(store.clone()).with_options(
            IngestOptions::default()
                .batch_size(3)
                .chunk_delay(Duration::ZERO)
                .item_timeout(Duration::from_secs(5)),
        );

        let items = vec![
            indexed_item(0, false),
            indexed_item(1, true),
            indexed_item(2, false),
            indexed_item(3, false),
        ];
        let outcome = ingestor.ingest(&items, c).await.unwrap();

        assert_eq!(outcome.attempted, 4);
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.status(), IngestStatus::PartialSuccess);

        let timed_out = &outcome.items[1];
        assert_eq!(timed_out.reference, "item-1");
        assert_eq!(timed_out.error.as_ref().unwrap().kind, FailureKind::Timeout);
        assert!(outcome.items[0].success && outcome.items[2].success);
        assert!(outcome.items[3].success);
        assert_eq!(outcome.items[3].chunk, 1);

        assert_eq!(backend.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(store.count_features(c).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ingest_into_new_collection_names_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("rajasthan");
        std::fs::create_dir(&sub).unwrap();
        let path = sub.join("towns.json");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "geometry": {"type": "Point", "coordinates": [76.74, 27.28]}, "properties": {"name": "A"}}
            ]}"#,
        )
        .unwrap();

        let store = SpatialStore::in_memory();
        let ingestor = BatchIngestor::new(store.clone());
        let (collection, outcome) = ingestor
            .ingest_into_new_collection(&[SourceItem::file(&path)], None)
            .await
            .unwrap();

        assert_eq!(collection.name, "rajasthan");
        assert_eq!(outcome.succeeded, 1);
        assert_eq!(outcome.total_features, 1);
        assert_eq!(store.count_features(collection.id).await.unwrap(), 1);
    }
}
