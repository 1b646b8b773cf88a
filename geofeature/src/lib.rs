//! # geofeature
//!
//! Normalisation de données géographiques hétérogènes en features canoniques.
//!
//! ## Features
//!
//! - Quatre formes d'entrée: tableau nu, FeatureCollection, feature seule, ligne tabulaire
//! - Validation structurelle des géométries (type + coordonnées)
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//! - Aucune I/O: le crate reçoit des octets ou du JSON déjà chargé
//!
//! ## Usage
//!
//! ```rust,ignore
//! use geofeature::{normalize_slice, CollectionId};
//!
//! let normalized = normalize_slice(br#"[{"geometry": {"type": "Point", "coordinates": [76.74, 27.28]}}]"#, CollectionId::new())?;
//! println!("Forme: {}", normalized.shape);
//!
//! for element in &normalized.elements {
//!     match element {
//!         Ok(feature) => println!("{}", feature.geometry.kind()),
//!         Err(e) => println!("rejeté: {}", e),
//!     }
//! }
//! ```

pub mod error;
pub mod geometry;
pub mod normalize;
pub mod types;
pub mod validate;

pub use error::{ElementError, NormalizeError, ValidationError};
pub use geometry::{Geometry, GeometryKind, Planar};
pub use normalize::{classify, normalize, normalize_slice, Normalized, Shape, ShapeKind};
pub use types::{Bounds, CollectionId, FeatureId, FeatureInput, Properties, DEFAULT_FEATURE_TYPE};
pub use validate::validate;
