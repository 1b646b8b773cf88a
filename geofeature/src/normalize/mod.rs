//! Normalisation des payloads vers des `FeatureInput` canoniques
//!
//! La forme du payload est d'abord classée (voir [`shape`]), puis chaque
//! élément est extrait et sa géométrie validée. Un échec de validation
//! reste attaché à son élément: il ne fait pas échouer le payload entier.

pub mod shape;
pub mod tabular;

pub use shape::{classify, Shape, ShapeKind};

use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::types::{Bounds, CollectionId, FeatureInput, Properties, DEFAULT_FEATURE_TYPE};
use crate::validate::validate;
use crate::{ElementError, NormalizeError, ValidationError};

/// Champs portant la géométrie, exclus des propriétés implicites
const GEOMETRY_FIELDS: &[&str] = &["geometry", "bounds", "bbox"];

/// Origine des propriétés quand `properties` est absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PropertiesFallback {
    /// L'élément entier (hors champs géométriques) sert de propriétés
    WholeElement,
    /// Map vide
    Empty,
}

/// Résultat de la normalisation d'un payload
#[derive(Debug)]
pub struct Normalized {
    /// Forme reconnue
    pub shape: ShapeKind,
    /// Un résultat par élément, dans l'ordre de la source
    pub elements: Vec<Result<FeatureInput, ElementError>>,
}

impl Normalized {
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Nombre d'éléments valides
    pub fn valid_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_ok()).count()
    }

    /// Échecs de validation, dans l'ordre de la source
    pub fn errors(&self) -> impl Iterator<Item = &ElementError> {
        self.elements.iter().filter_map(|e| e.as_ref().err())
    }

    /// Toutes les features, ou le premier élément invalide
    pub fn into_features(self) -> Result<Vec<FeatureInput>, ElementError> {
        self.elements.into_iter().collect()
    }
}

/// Normalise des octets JSON
///
/// # Errors
///
/// `MalformedPayload` si les octets ne sont pas du JSON, puis les erreurs
/// de [`normalize`].
pub fn normalize_slice(
    bytes: &[u8],
    collection_id: CollectionId,
) -> Result<Normalized, NormalizeError> {
    let payload: Value = serde_json::from_slice(bytes)?;
    normalize(&payload, collection_id)
}

/// Normalise un payload JSON vers la collection cible
///
/// # Errors
///
/// - `EmptyInput` si un tableau ou une FeatureCollection est vide
/// - `UnrecognizedShape` / `MalformedPayload` selon [`classify`]
pub fn normalize(payload: &Value, collection_id: CollectionId) -> Result<Normalized, NormalizeError> {
    let shape = classify(payload)?;

    let elements = match shape {
        Shape::BareArray(items) => {
            map_elements(items, PropertiesFallback::WholeElement, collection_id)?
        }
        Shape::LabeledCollection(features) => {
            map_elements(features, PropertiesFallback::Empty, collection_id)?
        }
        Shape::SingleFeature(obj) => {
            vec![map_object(0, obj, PropertiesFallback::Empty, collection_id)]
        }
        Shape::TabularRow(row) => vec![map_row(row, collection_id)],
    };

    let normalized = Normalized {
        shape: shape.kind(),
        elements,
    };

    debug!(
        shape = %normalized.shape,
        elements = normalized.len(),
        valid = normalized.valid_count(),
        "Payload normalized"
    );

    Ok(normalized)
}

fn map_elements(
    items: &[Value],
    fallback: PropertiesFallback,
    collection_id: CollectionId,
) -> Result<Vec<Result<FeatureInput, ElementError>>, NormalizeError> {
    if items.is_empty() {
        return Err(NormalizeError::EmptyInput);
    }

    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(obj) => map_object(index, obj, fallback, collection_id),
            _ => Err(ElementError {
                index,
                reason: ValidationError::MissingType,
            }),
        })
        .collect())
}

/// Extrait une feature d'un objet (élément de tableau, de collection, ou feature seule)
fn map_object(
    index: usize,
    obj: &Map<String, Value>,
    fallback: PropertiesFallback,
    collection_id: CollectionId,
) -> Result<FeatureInput, ElementError> {
    let at = |reason| ElementError { index, reason };

    // Sans champ geometry, un élément de tableau peut porter des colonnes lat/lng
    let mut coordinate_columns = None;
    let geometry = match obj.get("geometry") {
        Some(geometry) => validate(geometry).map_err(at)?,
        None => match tabular::coordinate_columns(obj) {
            Some(columns) => {
                coordinate_columns = Some(columns);
                tabular::point(obj, columns).map_err(at)?
            }
            None => return Err(at(ValidationError::MissingType)),
        },
    };

    let properties = match (obj.get("properties"), fallback) {
        (Some(Value::Object(props)), _) => props.clone(),
        (_, PropertiesFallback::Empty) => Properties::new(),
        (_, PropertiesFallback::WholeElement) => match coordinate_columns {
            Some(columns) => strip_geometry_fields(&tabular::properties(obj, columns)),
            None => strip_geometry_fields(obj),
        },
    };

    let feature_type = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_FEATURE_TYPE)
        .to_string();

    let bounds = obj
        .get("bounds")
        .or_else(|| obj.get("bbox"))
        .and_then(|b| parse_bounds(index, b));

    trace!(index, kind = %geometry.kind(), "Element mapped");

    Ok(FeatureInput {
        collection_id,
        feature_type,
        properties,
        geometry,
        bounds,
    })
}

fn map_row(row: &Map<String, Value>, collection_id: CollectionId) -> Result<FeatureInput, ElementError> {
    let at = |reason| ElementError { index: 0, reason };

    // classify() garantit la présence des colonnes
    let columns = tabular::coordinate_columns(row).ok_or(at(ValidationError::MissingCoordinates))?;
    let geometry = tabular::point(row, columns).map_err(at)?;

    Ok(FeatureInput {
        collection_id,
        feature_type: DEFAULT_FEATURE_TYPE.to_string(),
        properties: tabular::properties(row, columns),
        geometry,
        bounds: None,
    })
}

fn strip_geometry_fields(obj: &Map<String, Value>) -> Properties {
    obj.iter()
        .filter(|(k, _)| !GEOMETRY_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Boîte englobante: 4 (2D) ou 6 (3D) nombres, sinon ignorée
fn parse_bounds(index: usize, value: &Value) -> Option<Bounds> {
    let numbers: Option<Bounds> = value
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect();

    match numbers {
        Some(b) if b.len() == 4 || b.len() == 6 => Some(b),
        _ => {
            debug!(index, "Ignoring malformed bounds");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cid() -> CollectionId {
        CollectionId::new()
    }

    fn point(lng: f64, lat: f64) -> Value {
        json!({"type": "Point", "coordinates": [lng, lat]})
    }

    #[test]
    fn test_bare_array_produces_one_input_per_element() {
        let payload = Value::Array(
            (0..7)
                .map(|i| json!({"geometry": point(i as f64, 1.0), "properties": {"i": i}}))
                .collect(),
        );

        let normalized = normalize(&payload, cid()).unwrap();
        assert_eq!(normalized.shape, ShapeKind::BareArray);
        assert_eq!(normalized.len(), 7);
        assert_eq!(normalized.valid_count(), 7);

        let features = normalized.into_features().unwrap();
        assert_eq!(features[3].properties["i"], 3);
        assert_eq!(features[3].feature_type, "Feature");
    }

    #[test]
    fn test_bare_array_uses_whole_element_as_properties() {
        let payload = json!([{"name": "A", "pop": 12, "geometry": point(1.0, 2.0)}]);
        let features = normalize(&payload, cid()).unwrap().into_features().unwrap();

        let props = &features[0].properties;
        assert_eq!(props["name"], "A");
        assert_eq!(props["pop"], 12);
        assert!(!props.contains_key("geometry"));
    }

    #[test]
    fn test_collection_element_without_properties_is_empty() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "name": "A", "geometry": point(1.0, 2.0)}]
        });
        let normalized = normalize(&payload, cid()).unwrap();
        assert_eq!(normalized.shape, ShapeKind::LabeledCollection);

        let features = normalized.into_features().unwrap();
        assert!(features[0].properties.is_empty());
    }

    #[test]
    fn test_empty_collection_is_empty_input() {
        let payload = json!({"type": "FeatureCollection", "features": []});
        assert!(matches!(
            normalize(&payload, cid()),
            Err(NormalizeError::EmptyInput)
        ));
        assert!(matches!(
            normalize(&json!([]), cid()),
            Err(NormalizeError::EmptyInput)
        ));
    }

    #[test]
    fn test_single_feature() {
        let payload = json!({
            "type": "Feature",
            "geometry": point(76.74, 27.28),
            "properties": {"name": "A"},
            "bbox": [76.74, 27.28, 76.74, 27.28]
        });
        let features = normalize(&payload, cid()).unwrap().into_features().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].properties["name"], "A");
        assert_eq!(features[0].bounds.as_deref(), Some(&[76.74, 27.28, 76.74, 27.28][..]));
    }

    #[test]
    fn test_tabular_row() {
        let payload = json!({"name": "A", "latitude": 27.28, "longitude": 76.74});
        let normalized = normalize(&payload, cid()).unwrap();
        assert_eq!(normalized.shape, ShapeKind::TabularRow);

        let features = normalized.into_features().unwrap();
        assert_eq!(features[0].geometry.kind().as_str(), "Point");
        assert_eq!(features[0].properties.len(), 1);
    }

    #[test]
    fn test_bare_array_of_rows() {
        let payload = json!([{"name": "A", "lat": 1.0, "lng": 2.0}, {"name": "B", "lat": "3", "lng": "4"}]);
        let features = normalize(&payload, cid()).unwrap().into_features().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].properties.len(), 1);
        assert_eq!(features[1].properties["name"], "B");
    }

    #[test]
    fn test_validation_failure_attached_to_element() {
        let payload = json!([
            {"geometry": point(1.0, 2.0)},
            {"geometry": {"type": "Point"}},
            "not an object",
            {"geometry": point(3.0, 4.0)}
        ]);
        let normalized = normalize(&payload, cid()).unwrap();
        assert_eq!(normalized.len(), 4);
        assert_eq!(normalized.valid_count(), 2);

        let errors: Vec<_> = normalized.errors().cloned().collect();
        assert_eq!(
            errors,
            vec![
                ElementError {
                    index: 1,
                    reason: ValidationError::MissingCoordinates
                },
                ElementError {
                    index: 2,
                    reason: ValidationError::MissingType
                },
            ]
        );

        assert_eq!(normalized.valid_count(), 2);
        assert_eq!(normalized.into_features().unwrap_err().index, 1);
    }

    #[test]
    fn test_unrecognized_and_malformed() {
        assert!(matches!(
            normalize(&json!({"name": "x"}), cid()),
            Err(NormalizeError::UnrecognizedShape)
        ));
        assert!(matches!(
            normalize_slice(b"{not json", cid()),
            Err(NormalizeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_malformed_bounds_ignored() {
        let payload = json!([{"geometry": point(1.0, 2.0), "bounds": [1, 2, 3]}]);
        let features = normalize(&payload, cid()).unwrap().into_features().unwrap();
        assert!(features[0].bounds.is_none());
    }
}
