//! Types d'erreurs du stockage et de l'import

use geofeature::{CollectionId, ElementError, NormalizeError, ValidationError};
use thiserror::Error;

/// Erreurs des opérations du stockage spatial
#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection ou feature inconnue
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Géométrie structurellement invalide
    #[error("validation failure: {0}")]
    Validation(#[from] ValidationError),

    /// Élément invalide dans un document importé
    #[error("validation failure at {0}")]
    Element(#[from] ElementError),

    /// Document sans discriminant `type` ni liste `features`
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// Payload rejeté par le normaliseur
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    /// Requête de proximité mal formée
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Appel au datastore en échec
    #[error("store unavailable: {0:#}")]
    Unavailable(#[from] anyhow::Error),
}

impl StoreError {
    pub fn collection_not_found(id: CollectionId) -> Self {
        Self::NotFound {
            entity: "collection",
            id: id.to_string(),
        }
    }

    pub fn feature_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "feature",
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Échec d'un import par lots au niveau de l'appel (aucun élément tenté)
#[derive(Debug, Error)]
pub enum IngestError {
    /// La collection cible n'existe pas
    #[error("target collection not found: {0}")]
    CollectionNotFound(CollectionId),

    /// Datastore injoignable avant tout traitement
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
