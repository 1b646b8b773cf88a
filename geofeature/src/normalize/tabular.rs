//! Lignes tabulaires: colonnes latitude/longitude vers un Point

use geo::Point;
use serde_json::{Map, Value};

use crate::geometry::Geometry;
use crate::types::Properties;
use crate::ValidationError;

const LATITUDE_COLUMNS: &[&str] = &["lat", "latitude"];
const LONGITUDE_COLUMNS: &[&str] = &["lng", "lon", "long", "longitude"];

/// Noms réels des colonnes de coordonnées d'une ligne
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateColumns<'a> {
    pub latitude: &'a str,
    pub longitude: &'a str,
}

/// Cherche les colonnes latitude et longitude (insensible à la casse)
pub fn coordinate_columns(row: &Map<String, Value>) -> Option<CoordinateColumns<'_>> {
    let find = |candidates: &[&str]| {
        row.keys()
            .find(|k| candidates.iter().any(|c| k.eq_ignore_ascii_case(c)))
            .map(String::as_str)
    };

    Some(CoordinateColumns {
        latitude: find(LATITUDE_COLUMNS)?,
        longitude: find(LONGITUDE_COLUMNS)?,
    })
}

/// Construit le Point d'une ligne
pub fn point(
    row: &Map<String, Value>,
    columns: CoordinateColumns<'_>,
) -> Result<Geometry, ValidationError> {
    let lat = number(row.get(columns.latitude), columns.latitude)?;
    let lng = number(row.get(columns.longitude), columns.longitude)?;
    Ok(Geometry::from(Point::new(lng, lat)))
}

/// Toutes les colonnes sauf les coordonnées
pub fn properties(row: &Map<String, Value>, columns: CoordinateColumns<'_>) -> Properties {
    row.iter()
        .filter(|(k, _)| k.as_str() != columns.latitude && k.as_str() != columns.longitude)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Valeur numérique, éventuellement sous forme de chaîne ("27.28")
fn number(value: Option<&Value>, column: &str) -> Result<f64, ValidationError> {
    let parsed = match value {
        None | Some(Value::Null) => return Err(ValidationError::MissingCoordinates),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(ValidationError::invalid(format!(
            "column {} is not a number",
            column
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(obj) => obj,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_columns_case_insensitive() {
        let r = row(json!({"Latitude": 1.0, "LON": 2.0}));
        let cols = coordinate_columns(&r).unwrap();
        assert_eq!(cols.latitude, "Latitude");
        assert_eq!(cols.longitude, "LON");
    }

    #[test]
    fn test_point_from_strings() {
        let r = row(json!({"lat": "27.28", "lng": " 76.74 ", "name": "A"}));
        let cols = coordinate_columns(&r).unwrap();
        let geom = point(&r, cols).unwrap();
        assert_eq!(geom, Geometry::from(Point::new(76.74, 27.28)));

        let props = properties(&r, cols);
        assert_eq!(props.len(), 1);
        assert_eq!(props["name"], "A");
    }

    #[test]
    fn test_point_invalid_column() {
        let r = row(json!({"lat": "north", "lng": 2.0}));
        let cols = coordinate_columns(&r).unwrap();
        assert!(matches!(
            point(&r, cols),
            Err(ValidationError::InvalidCoordinates(_))
        ));

        let r = row(json!({"lat": null, "lng": 2.0}));
        let cols = coordinate_columns(&r).unwrap();
        assert_eq!(point(&r, cols), Err(ValidationError::MissingCoordinates));
    }

    #[test]
    fn test_no_columns() {
        assert!(coordinate_columns(&row(json!({"lat": 1.0}))).is_none());
    }
}
