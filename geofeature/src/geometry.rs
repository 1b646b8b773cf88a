//! Modèle de géométrie fermé
//!
//! Une géométrie est l'un des six types GeoJSON supportés, portés par les
//! types `geo`. Les collections de géométries ne sont pas acceptées.
//! Les ordonnées supplémentaires (Z, M) sont conservées telles quelles.

use std::fmt;
use std::str::FromStr;

use geo::{Coord, CoordsIter, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Discriminant de type d'une géométrie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    /// Nom GeoJSON du type
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }
}

impl fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Point" => Ok(GeometryKind::Point),
            "LineString" => Ok(GeometryKind::LineString),
            "Polygon" => Ok(GeometryKind::Polygon),
            "MultiPoint" => Ok(GeometryKind::MultiPoint),
            "MultiLineString" => Ok(GeometryKind::MultiLineString),
            "MultiPolygon" => Ok(GeometryKind::MultiPolygon),
            other => Err(ValidationError::UnsupportedType(other.to_string())),
        }
    }
}

/// Forme planaire d'une géométrie (longitude/latitude, WGS84)
#[derive(Debug, Clone, PartialEq)]
pub enum Planar {
    Point(Point),
    LineString(LineString),
    Polygon(Polygon),
    MultiPoint(MultiPoint),
    MultiLineString(MultiLineString),
    MultiPolygon(MultiPolygon),
}

impl Planar {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Planar::Point(_) => GeometryKind::Point,
            Planar::LineString(_) => GeometryKind::LineString,
            Planar::Polygon(_) => GeometryKind::Polygon,
            Planar::MultiPoint(_) => GeometryKind::MultiPoint,
            Planar::MultiLineString(_) => GeometryKind::MultiLineString,
            Planar::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }
}

/// Géométrie typée d'une feature
///
/// Les algorithmes travaillent sur la forme planaire. Les ordonnées au-delà
/// de x/y (altitude, mesure) sont conservées par sommet, dans l'ordre des
/// positions GeoJSON, pour que la géométrie se resérialise à l'identique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "geojson::Geometry", into = "geojson::Geometry")]
pub struct Geometry {
    planar: Planar,
    /// `None` si toutes les positions sont en 2D
    extra: Option<Vec<Vec<f64>>>,
}

impl Geometry {
    /// Type de la géométrie, toujours cohérent avec sa forme
    pub fn kind(&self) -> GeometryKind {
        self.planar.kind()
    }

    pub fn planar(&self) -> &Planar {
        &self.planar
    }

    /// Vrai si au moins une position porte plus de deux nombres
    pub fn has_extra_ordinates(&self) -> bool {
        self.extra.is_some()
    }

    /// Convertit vers `geo::Geometry` pour les algorithmes de l'écosystème
    pub fn to_geo(&self) -> geo::Geometry {
        match &self.planar {
            Planar::Point(p) => geo::Geometry::Point(*p),
            Planar::LineString(ls) => geo::Geometry::LineString(ls.clone()),
            Planar::Polygon(p) => geo::Geometry::Polygon(p.clone()),
            Planar::MultiPoint(mp) => geo::Geometry::MultiPoint(mp.clone()),
            Planar::MultiLineString(mls) => geo::Geometry::MultiLineString(mls.clone()),
            Planar::MultiPolygon(mp) => geo::Geometry::MultiPolygon(mp.clone()),
        }
    }

    /// Tous les sommets de la géométrie
    pub fn vertices(&self) -> Vec<Point> {
        self.to_geo().coords_iter().map(Point::from).collect()
    }

    /// Géométrie GeoJSON équivalente
    pub fn to_geojson(&self) -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::from(self))
    }
}

impl From<Planar> for Geometry {
    fn from(planar: Planar) -> Self {
        Self {
            planar,
            extra: None,
        }
    }
}

impl From<Point> for Geometry {
    fn from(point: Point) -> Self {
        Planar::Point(point).into()
    }
}

/// Réécrit les positions en réinjectant les ordonnées supplémentaires
struct PositionWriter<'a> {
    extra: Option<&'a [Vec<f64>]>,
    next: usize,
}

impl PositionWriter<'_> {
    fn position(&mut self, c: &Coord) -> Vec<f64> {
        let mut pos = vec![c.x, c.y];
        if let Some(extra) = self.extra.and_then(|e| e.get(self.next)) {
            pos.extend_from_slice(extra);
        }
        self.next += 1;
        pos
    }

    fn line(&mut self, ls: &LineString) -> Vec<Vec<f64>> {
        ls.0.iter().map(|c| self.position(c)).collect()
    }

    fn polygon(&mut self, p: &Polygon) -> Vec<Vec<Vec<f64>>> {
        std::iter::once(p.exterior())
            .chain(p.interiors().iter())
            .map(|ring| self.line(ring))
            .collect()
    }
}

impl From<&Geometry> for geojson::Value {
    fn from(geom: &Geometry) -> Self {
        let mut w = PositionWriter {
            extra: geom.extra.as_deref(),
            next: 0,
        };

        match &geom.planar {
            Planar::Point(p) => geojson::Value::Point(w.position(&p.0)),
            Planar::LineString(ls) => geojson::Value::LineString(w.line(ls)),
            Planar::Polygon(p) => geojson::Value::Polygon(w.polygon(p)),
            Planar::MultiPoint(mp) => {
                geojson::Value::MultiPoint(mp.0.iter().map(|p| w.position(&p.0)).collect())
            }
            Planar::MultiLineString(mls) => {
                geojson::Value::MultiLineString(mls.0.iter().map(|l| w.line(l)).collect())
            }
            Planar::MultiPolygon(mp) => {
                geojson::Value::MultiPolygon(mp.0.iter().map(|p| w.polygon(p)).collect())
            }
        }
    }
}

impl From<Geometry> for geojson::Geometry {
    fn from(geom: Geometry) -> Self {
        geom.to_geojson()
    }
}

impl TryFrom<geojson::Geometry> for Geometry {
    type Error = ValidationError;

    fn try_from(geom: geojson::Geometry) -> Result<Self, Self::Error> {
        Geometry::try_from(geom.value)
    }
}

impl TryFrom<geojson::Value> for Geometry {
    type Error = ValidationError;

    fn try_from(value: geojson::Value) -> Result<Self, Self::Error> {
        let mut r = PositionReader::default();

        let planar = match value {
            geojson::Value::Point(pos) => Planar::Point(Point::from(r.coord(&pos)?)),
            geojson::Value::LineString(positions) => Planar::LineString(r.line_string(&positions)?),
            geojson::Value::Polygon(rings) => Planar::Polygon(r.polygon(&rings)?),
            geojson::Value::MultiPoint(positions) => {
                non_empty(&positions, "MultiPoint")?;
                let points = positions
                    .iter()
                    .map(|p| r.coord(p).map(Point::from))
                    .collect::<Result<Vec<_>, _>>()?;
                Planar::MultiPoint(MultiPoint::new(points))
            }
            geojson::Value::MultiLineString(lines) => {
                non_empty(&lines, "MultiLineString")?;
                let lines = lines
                    .iter()
                    .map(|l| r.line_string(l))
                    .collect::<Result<Vec<_>, _>>()?;
                Planar::MultiLineString(MultiLineString::new(lines))
            }
            geojson::Value::MultiPolygon(polygons) => {
                non_empty(&polygons, "MultiPolygon")?;
                let polygons = polygons
                    .iter()
                    .map(|p| r.polygon(p))
                    .collect::<Result<Vec<_>, _>>()?;
                Planar::MultiPolygon(MultiPolygon::new(polygons))
            }
            geojson::Value::GeometryCollection(_) => {
                return Err(ValidationError::UnsupportedType(
                    "GeometryCollection".to_string(),
                ))
            }
        };

        Ok(Geometry {
            planar,
            extra: r.into_extra(),
        })
    }
}

/// Lit les positions et met de côté les ordonnées au-delà de x/y
#[derive(Default)]
struct PositionReader {
    extra: Vec<Vec<f64>>,
}

impl PositionReader {
    /// Une position: au moins 2 nombres finis
    fn coord(&mut self, pos: &[f64]) -> Result<Coord, ValidationError> {
        match pos {
            [x, y, rest @ ..] if x.is_finite() && y.is_finite() => {
                self.extra.push(rest.to_vec());
                Ok(Coord { x: *x, y: *y })
            }
            [_, _, ..] => Err(ValidationError::invalid("position is not finite")),
            _ => Err(ValidationError::invalid(format!(
                "position needs at least 2 numbers, got {}",
                pos.len()
            ))),
        }
    }

    fn line_string(&mut self, positions: &[Vec<f64>]) -> Result<LineString, ValidationError> {
        if positions.len() < 2 {
            return Err(ValidationError::invalid(format!(
                "LineString needs at least 2 positions, got {}",
                positions.len()
            )));
        }
        let coords = positions
            .iter()
            .map(|p| self.coord(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(LineString::new(coords))
    }

    /// Anneau: >= 4 positions, premier == dernier
    fn ring(&mut self, positions: &[Vec<f64>]) -> Result<LineString, ValidationError> {
        if positions.len() < 4 {
            return Err(ValidationError::invalid(format!(
                "polygon ring needs at least 4 positions, got {}",
                positions.len()
            )));
        }
        if positions.first() != positions.last() {
            return Err(ValidationError::invalid("polygon ring is not closed"));
        }
        self.line_string(positions)
    }

    fn polygon(&mut self, rings: &[Vec<Vec<f64>>]) -> Result<Polygon, ValidationError> {
        let Some((exterior, interiors)) = rings.split_first() else {
            return Err(ValidationError::invalid("Polygon has no rings"));
        };
        let exterior = self.ring(exterior)?;
        let interiors = interiors
            .iter()
            .map(|r| self.ring(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Polygon::new(exterior, interiors))
    }

    fn into_extra(self) -> Option<Vec<Vec<f64>>> {
        if self.extra.iter().all(Vec::is_empty) {
            None
        } else {
            Some(self.extra)
        }
    }
}

fn non_empty<T>(items: &[T], what: &str) -> Result<(), ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::invalid(format!("{} has no members", what)));
    }
    Ok(())
}
