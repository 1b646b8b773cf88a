//! Modèle de données du stockage: collections et features

use chrono::{DateTime, Utc};
use geofeature::{
    Bounds, CollectionId, FeatureId, FeatureInput, Geometry, GeometryKind, Properties,
    ValidationError,
};
use serde::{Deserialize, Serialize};

use super::index::SpatialIndex;

/// Groupe de features adressable indépendamment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Collection {
    pub id: CollectionId,
    pub name: String,
    pub description: Option<String>,
    /// Données arbitraires attachées par l'appelant
    pub payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Attributs d'une nouvelle collection
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl NewCollection {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Modification partielle d'une collection (`None` = inchangé)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CollectionPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub payload: Option<serde_json::Value>,
}

impl CollectionPatch {
    pub(crate) fn apply(self, collection: &mut Collection) {
        if let Some(name) = self.name {
            collection.name = name;
        }
        if let Some(description) = self.description {
            collection.description = Some(description);
        }
        if let Some(payload) = self.payload {
            collection.payload = Some(payload);
        }
    }
}

/// Collection avec son nombre de features
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    #[serde(flatten)]
    pub collection: Collection,
    pub feature_count: u64,
}

/// Collection avec la liste complète de ses features
#[derive(Debug, Clone, Serialize)]
pub struct CollectionWithFeatures {
    #[serde(flatten)]
    pub collection: Collection,
    pub features: Vec<Feature>,
}

/// Feature non validée, telle que reçue d'un appelant
///
/// Sert à la création simple et à la mise à jour (remplacement complet).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureDraft {
    #[serde(rename = "type")]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub geometry: serde_json::Value,
    pub bounds: Option<Bounds>,
}

impl FeatureDraft {
    /// Valide la géométrie et produit une entrée canonique
    pub fn into_input(self, collection_id: CollectionId) -> Result<FeatureInput, ValidationError> {
        let geometry = geofeature::validate(&self.geometry)?;
        Ok(FeatureInput {
            collection_id,
            feature_type: self
                .feature_type
                .unwrap_or_else(|| geofeature::DEFAULT_FEATURE_TYPE.to_string()),
            properties: self.properties,
            geometry,
            bounds: self.bounds,
        })
    }
}

/// Enregistrement géographique appartenant à exactement une collection
///
/// La géométrie n'est modifiable qu'en reconstruisant la feature, ce qui
/// garantit que la représentation indexée ne diverge jamais.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    pub id: FeatureId,
    pub collection_id: CollectionId,
    pub feature_type: String,
    pub properties: Properties,
    geometry: Geometry,
    pub bounds: Option<Bounds>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    index: SpatialIndex,
}

impl Feature {
    /// Construit une feature et dérive sa représentation indexée
    pub fn from_input(
        id: FeatureId,
        input: FeatureInput,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let index = SpatialIndex::derive(&input.geometry)?;
        Ok(Self {
            id,
            collection_id: input.collection_id,
            feature_type: input.feature_type,
            properties: input.properties,
            geometry: input.geometry,
            bounds: input.bounds,
            enabled: true,
            created_at: now,
            updated_at: now,
            index,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Type de géométrie, dérivé de la géométrie elle-même
    pub fn geometry_kind(&self) -> GeometryKind {
        self.geometry.kind()
    }

    pub fn spatial_index(&self) -> &SpatialIndex {
        &self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> FeatureDraft {
        serde_json::from_value(json!({
            "geometry": {"type": "Point", "coordinates": [76.74, 27.28]},
            "properties": {"name": "A"}
        }))
        .unwrap()
    }

    #[test]
    fn test_draft_defaults_feature_type() {
        let input = draft().into_input(CollectionId::new()).unwrap();
        assert_eq!(input.feature_type, "Feature");
        assert_eq!(input.properties["name"], "A");
    }

    #[test]
    fn test_draft_without_geometry_is_rejected() {
        let draft = FeatureDraft::default();
        assert_eq!(
            draft.into_input(CollectionId::new()),
            Err(ValidationError::MissingType)
        );
    }

    #[test]
    fn test_feature_derives_index() {
        let input = draft().into_input(CollectionId::new()).unwrap();
        let feature = Feature::from_input(FeatureId::new(), input, Utc::now()).unwrap();
        assert_eq!(feature.geometry_kind(), GeometryKind::Point);
        assert!(feature.spatial_index().ewkt().starts_with("SRID=4326;"));
        assert!(feature.enabled);
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let now = Utc::now();
        let mut collection = Collection {
            id: CollectionId::new(),
            name: "old".into(),
            description: Some("desc".into()),
            payload: None,
            created_at: now,
            updated_at: now,
        };
        CollectionPatch {
            name: Some("new".into()),
            ..Default::default()
        }
        .apply(&mut collection);

        assert_eq!(collection.name, "new");
        assert_eq!(collection.description.as_deref(), Some("desc"));
    }

    #[test]
    fn test_feature_serializes_without_index() {
        let input = draft().into_input(CollectionId::new()).unwrap();
        let feature = Feature::from_input(FeatureId::new(), input, Utc::now()).unwrap();
        let json = serde_json::to_value(&feature).unwrap();
        assert_eq!(json["geometry"]["type"], "Point");
        assert!(json.get("index").is_none());
    }
}
