//! Validateur de géométrie
//!
//! Contrôles structurels sur une géométrie non typée (JSON): présence du
//! type, présence de coordonnées adaptées au type. Fonction pure.

use serde::Deserialize;
use serde_json::Value;

use crate::geometry::{Geometry, GeometryKind};
use crate::ValidationError;

type Position = Vec<f64>;

/// Valide une géométrie GeoJSON et retourne sa forme typée
///
/// # Errors
///
/// - `MissingType` si `type` est absent ou n'est pas une chaîne
/// - `UnsupportedType` si le type n'est pas l'un des six types supportés
/// - `MissingCoordinates` si `coordinates` est absent, nul ou vide
/// - `InvalidCoordinates` si la structure ne correspond pas au type
pub fn validate(geometry: &Value) -> Result<Geometry, ValidationError> {
    let type_name = geometry
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingType)?;

    let kind: GeometryKind = type_name.parse()?;

    let coordinates = match geometry.get("coordinates") {
        None | Some(Value::Null) => return Err(ValidationError::MissingCoordinates),
        Some(Value::Array(items)) if items.is_empty() => {
            return Err(ValidationError::MissingCoordinates)
        }
        Some(value @ Value::Array(_)) => value,
        Some(_) => return Err(ValidationError::invalid("coordinates must be an array")),
    };

    let value = match kind {
        GeometryKind::Point => geojson::Value::Point(nested(coordinates, kind)?),
        GeometryKind::LineString => geojson::Value::LineString(nested(coordinates, kind)?),
        GeometryKind::Polygon => geojson::Value::Polygon(nested(coordinates, kind)?),
        GeometryKind::MultiPoint => geojson::Value::MultiPoint(nested(coordinates, kind)?),
        GeometryKind::MultiLineString => {
            geojson::Value::MultiLineString(nested::<Vec<Vec<Position>>>(coordinates, kind)?)
        }
        GeometryKind::MultiPolygon => {
            geojson::Value::MultiPolygon(nested::<Vec<Vec<Vec<Position>>>>(coordinates, kind)?)
        }
    };

    Geometry::try_from(value)
}

/// Lit les coordonnées avec la profondeur d'imbrication attendue
fn nested<'de, T: Deserialize<'de>>(
    coordinates: &'de Value,
    kind: GeometryKind,
) -> Result<T, ValidationError> {
    T::deserialize(coordinates).map_err(|e| {
        ValidationError::invalid(format!("coordinates do not match {}: {}", kind, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_point() {
        let geom = validate(&json!({"type": "Point", "coordinates": [76.74, 27.28]})).unwrap();
        assert_eq!(geom.kind(), GeometryKind::Point);
    }

    #[test]
    fn test_missing_type() {
        assert_eq!(
            validate(&json!({"coordinates": [1.0, 2.0]})),
            Err(ValidationError::MissingType)
        );
        assert_eq!(
            validate(&json!({"type": 42, "coordinates": [1.0, 2.0]})),
            Err(ValidationError::MissingType)
        );
        assert_eq!(validate(&Value::Null), Err(ValidationError::MissingType));
    }

    #[test]
    fn test_missing_coordinates() {
        assert_eq!(
            validate(&json!({"type": "Point"})),
            Err(ValidationError::MissingCoordinates)
        );
        assert_eq!(
            validate(&json!({"type": "Polygon", "coordinates": null})),
            Err(ValidationError::MissingCoordinates)
        );
        assert_eq!(
            validate(&json!({"type": "LineString", "coordinates": []})),
            Err(ValidationError::MissingCoordinates)
        );
    }

    #[test]
    fn test_wrong_nesting() {
        let err = validate(&json!({"type": "Polygon", "coordinates": [1.0, 2.0]})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCoordinates(_)));

        let err = validate(&json!({"type": "Point", "coordinates": "1,2"})).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCoordinates(_)));
    }

    #[test]
    fn test_unsupported_type() {
        assert_eq!(
            validate(&json!({"type": "Circle", "coordinates": [1.0, 2.0]})),
            Err(ValidationError::UnsupportedType("Circle".to_string()))
        );
    }

    #[test]
    fn test_deterministic() {
        let geom = json!({"type": "MultiPoint", "coordinates": [[1.0, 2.0], [3.0, 4.0]]});
        assert_eq!(validate(&geom), validate(&geom));
    }
}
