//! Types d'erreurs pour le crate geofeature

use thiserror::Error;

/// Raisons de rejet d'une géométrie par le validateur
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Pas de discriminant `type`
    #[error("geometry has no type")]
    MissingType,

    /// Pas de `coordinates` adaptées au type
    #[error("geometry has no coordinates")]
    MissingCoordinates,

    /// Type reconnu par GeoJSON mais non supporté (ex: GeometryCollection)
    #[error("unsupported geometry type: {0}")]
    UnsupportedType(String),

    /// Coordonnées présentes mais structurellement invalides
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(String),
}

impl ValidationError {
    /// Crée une erreur de coordonnées invalides avec contexte
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidCoordinates(reason.into())
    }
}

/// Erreurs de normalisation portant sur le payload entier
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Octets illisibles en JSON, ou forme reconnue mais mal construite
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Tableau nu ou FeatureCollection sans aucun élément
    #[error("payload contains no features")]
    EmptyInput,

    /// Aucune des formes supportées, et aucun champ geometry
    #[error("unrecognized payload shape")]
    UnrecognizedShape,
}

impl From<serde_json::Error> for NormalizeError {
    fn from(e: serde_json::Error) -> Self {
        Self::MalformedPayload(e.to_string())
    }
}

/// Échec de validation rattaché à un élément précis du payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("element {index}: {reason}")]
pub struct ElementError {
    /// Position de l'élément dans le payload source
    pub index: usize,
    /// Raison du rejet
    pub reason: ValidationError,
}
