//! # geostore
//!
//! Stockage de features géographiques par collection sur PostGIS, import
//! par lots et recherche par rayon géodésique.
//!
//! ## Features
//!
//! - Collections et features avec suppression en cascade
//! - Représentation indexée (EWKT, SRID 4326) toujours dérivée de la géométrie
//! - Import par lots: parallélisme borné, lots séquentiels, échecs par élément
//! - Recherche "à moins de r km" sur l'ellipsoïde WGS84
//! - Backend PostGIS (pool deadpool) ou en mémoire
//! - Export GeoJSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Créer les tables
//! geostore init
//!
//! # Importer des fichiers dans une nouvelle collection
//! geostore import --new-collection villes ./data/*.json --report report.json
//!
//! # Features à moins de 25 km
//! geostore near --lat 27.28 --lng 76.74 --radius 25
//! ```
//!
//! ## Usage bibliothèque
//!
//! ```rust,ignore
//! use geostore::{BatchIngestor, RadiusQuery, SourceItem, SpatialStore};
//!
//! let store = SpatialStore::in_memory();
//! let (collection, outcome) = BatchIngestor::new(store.clone())
//!     .ingest_into_new_collection(&[SourceItem::file("data/villes/a.json")], None)
//!     .await?;
//! println!("{}", outcome.summary());
//!
//! let near = store.find_within_radius(&RadiusQuery::new(27.28, 76.74).radius_km(1.0)).await?;
//! ```

pub mod config;
pub mod error;
pub mod export;
pub mod ingest;
pub mod query;
pub mod store;

pub use config::Settings;
pub use error::{IngestError, StoreError};
pub use ingest::{
    BatchIngestor, BatchUploadOutcome, FailureKind, IngestMode, IngestOptions, IngestStatus,
    ItemOutcome, SourceItem,
};
pub use query::{RadiusQuery, DEFAULT_RADIUS_KM};
pub use store::pool::{create_pool, DatabaseConfig};
pub use store::{
    Collection, Feature, FeatureDraft, MemoryBackend, NewCollection, PgBackend, SpatialStore,
};
