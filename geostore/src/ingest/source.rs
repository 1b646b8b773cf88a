//! Éléments source d'un import par lots

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use geofeature::{CollectionId, Normalized};
use serde_json::Value;

use super::report::{FailureKind, ItemFailure};

/// Nom de collection par défaut quand aucun chemin n'est exploitable
const FALLBACK_COLLECTION_NAME: &str = "import";

/// Élément à importer: fichier, octets déjà chargés ou enregistrement JSON
#[derive(Debug, Clone)]
pub enum SourceItem {
    File(PathBuf),
    Inline { reference: String, bytes: Vec<u8> },
    Record { reference: String, value: Value },
}

impl SourceItem {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    pub fn inline(reference: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::Inline {
            reference: reference.into(),
            bytes: bytes.into(),
        }
    }

    pub fn record(reference: impl Into<String>, value: Value) -> Self {
        Self::Record {
            reference: reference.into(),
            value,
        }
    }

    /// Référence affichée dans le rapport
    pub fn reference(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline { reference, .. } | Self::Record { reference, .. } => reference.clone(),
        }
    }

    /// Lit et normalise l'élément (aucune écriture)
    pub(crate) async fn load(
        &self,
        collection_id: CollectionId,
    ) -> Result<Normalized, ItemFailure> {
        let normalized = match self {
            Self::File(path) => {
                let bytes = tokio::fs::read(path).await.map_err(|e| read_failure(path, e))?;
                geofeature::normalize_slice(&bytes, collection_id)
            }
            Self::Inline { bytes, .. } => geofeature::normalize_slice(bytes, collection_id),
            Self::Record { value, .. } => geofeature::normalize(value, collection_id),
        };

        normalized.map_err(|e| ItemFailure::new(FailureKind::MalformedPayload, e.to_string()))
    }
}

fn read_failure(path: &Path, err: std::io::Error) -> ItemFailure {
    let kind = match err.kind() {
        ErrorKind::NotFound => FailureKind::SourceNotFound,
        _ => FailureKind::UnreadableSource,
    };
    ItemFailure::new(kind, format!("{}: {}", path.display(), err))
}

/// Nom de collection dérivé du dossier source
///
/// `data/rajasthan/towns.json` donne `rajasthan`; un fichier sans dossier
/// parent donne son nom sans extension.
pub fn collection_name_from_path(path: &Path) -> String {
    let from_parent = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty());

    let from_stem = || {
        path.file_stem()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
    };

    from_parent
        .or_else(from_stem)
        .unwrap_or(FALLBACK_COLLECTION_NAME)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_name_from_path() {
        assert_eq!(
            collection_name_from_path(Path::new("data/rajasthan/towns.json")),
            "rajasthan"
        );
        assert_eq!(collection_name_from_path(Path::new("towns.json")), "towns");
        assert_eq!(collection_name_from_path(Path::new("")), "import");
    }

    #[test]
    fn test_reference() {
        assert_eq!(SourceItem::file("a/b.json").reference(), "a/b.json");
        assert_eq!(SourceItem::record("row-1", json!({})).reference(), "row-1");
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let item = SourceItem::file(dir.path().join("missing.json"));
        let err = item.load(CollectionId::new()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::SourceNotFound);
    }

    #[tokio::test]
    async fn test_load_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let item = SourceItem::file(dir.path());
        let err = item.load(CollectionId::new()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::UnreadableSource);
    }

    #[tokio::test]
    async fn test_load_malformed_inline() {
        let item = SourceItem::inline("bad", b"{not json".to_vec());
        let err = item.load(CollectionId::new()).await.unwrap_err();
        assert_eq!(err.kind, FailureKind::MalformedPayload);
    }

    #[tokio::test]
    async fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.json");
        std::fs::write(
            &path,
            r#"[{"geometry": {"type": "Point", "coordinates": [1.0, 2.0]}}]"#,
        )
        .unwrap();

        let normalized = SourceItem::file(&path).load(CollectionId::new()).await.unwrap();
        assert_eq!(normalized.valid_count(), 1);
    }
}
