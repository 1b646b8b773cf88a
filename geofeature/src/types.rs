//! Types de données pour le crate geofeature

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::Geometry;

/// Map de propriétés arbitraires, opaque pour le coeur
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Boîte englobante GeoJSON (4 ou 6 nombres)
pub type Bounds = Vec<f64>;

/// Identifiant opaque et immuable d'une collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(pub Uuid);

impl CollectionId {
    /// Génère un nouvel identifiant
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CollectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for CollectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifiant opaque et unique d'une feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub Uuid);

impl FeatureId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeatureId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for FeatureId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Type de feature par défaut quand l'entrée n'en porte pas
pub const DEFAULT_FEATURE_TYPE: &str = "Feature";

/// Feature normalisée, prête à être persistée
///
/// La géométrie est déjà validée: construire un `FeatureInput` suppose
/// d'avoir une `Geometry` typée.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInput {
    /// Collection cible
    pub collection_id: CollectionId,

    /// Type de feature (ex: "Feature")
    pub feature_type: String,

    /// Attributs de la feature
    pub properties: Properties,

    /// Géométrie validée
    pub geometry: Geometry,

    /// Boîte englobante fournie par la source
    pub bounds: Option<Bounds>,
}

impl FeatureInput {
    /// Crée une entrée avec le type par défaut et sans propriétés
    pub fn new(collection_id: CollectionId, geometry: Geometry) -> Self {
        Self {
            collection_id,
            feature_type: DEFAULT_FEATURE_TYPE.to_string(),
            properties: Properties::new(),
            geometry,
            bounds: None,
        }
    }

    /// Ajoute des propriétés
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }
}
