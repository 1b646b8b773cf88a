//! Classification de la forme d'un payload
//!
//! Ordre de priorité (premier qui correspond):
//! 1. tableau nu
//! 2. FeatureCollection étiquetée
//! 3. objet feature unique (champ `geometry`)
//! 4. ligne tabulaire (colonnes latitude/longitude)

use std::fmt;

use serde_json::{Map, Value};

use super::tabular;
use crate::NormalizeError;

/// Forme reconnue d'un payload, avec accès aux éléments
#[derive(Debug, Clone, Copy)]
pub enum Shape<'a> {
    /// Tableau JSON: chaque élément est une feature
    BareArray(&'a [Value]),
    /// `{"type": "FeatureCollection", "features": [...]}`
    LabeledCollection(&'a [Value]),
    /// Objet portant un champ `geometry`
    SingleFeature(&'a Map<String, Value>),
    /// Objet sans `geometry` mais avec des colonnes de coordonnées
    TabularRow(&'a Map<String, Value>),
}

/// Discriminant de forme (pour logs et rapports)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    BareArray,
    LabeledCollection,
    SingleFeature,
    TabularRow,
}

impl Shape<'_> {
    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::BareArray(_) => ShapeKind::BareArray,
            Shape::LabeledCollection(_) => ShapeKind::LabeledCollection,
            Shape::SingleFeature(_) => ShapeKind::SingleFeature,
            Shape::TabularRow(_) => ShapeKind::TabularRow,
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeKind::BareArray => "bare array",
            ShapeKind::LabeledCollection => "feature collection",
            ShapeKind::SingleFeature => "single feature",
            ShapeKind::TabularRow => "tabular row",
        };
        f.write_str(name)
    }
}

/// Détermine la forme d'un payload
///
/// # Errors
///
/// - `MalformedPayload` pour une FeatureCollection sans tableau `features`
/// - `UnrecognizedShape` si aucune forme ne correspond
pub fn classify(payload: &Value) -> Result<Shape<'_>, NormalizeError> {
    let obj = match payload {
        Value::Array(items) => return Ok(Shape::BareArray(items)),
        Value::Object(obj) => obj,
        _ => return Err(NormalizeError::UnrecognizedShape),
    };

    if obj.get("type").and_then(Value::as_str) == Some("FeatureCollection") {
        return match obj.get("features") {
            Some(Value::Array(features)) => Ok(Shape::LabeledCollection(features)),
            Some(_) => Err(NormalizeError::MalformedPayload(
                "FeatureCollection features must be an array".to_string(),
            )),
            None => Err(NormalizeError::MalformedPayload(
                "FeatureCollection has no features".to_string(),
            )),
        };
    }

    if obj.contains_key("geometry") {
        return Ok(Shape::SingleFeature(obj));
    }

    if tabular::coordinate_columns(obj).is_some() {
        return Ok(Shape::TabularRow(obj));
    }

    Err(NormalizeError::UnrecognizedShape)
}
