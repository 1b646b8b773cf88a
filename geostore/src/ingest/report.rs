//! Rapport d'import par lots
//!
//! Un import retourne toujours un rapport, même si tous les éléments ont
//! échoué: l'appelant consulte `succeeded` / `failed`.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestStatus {
    /// Tous les éléments tentés ont réussi
    Success,
    /// Au moins un succès et au moins un échec
    PartialSuccess,
    /// Aucun succès
    Failed,
}

/// Catégorie d'échec d'un élément source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    /// Fichier source introuvable
    SourceNotFound,
    /// Source illisible (droits, I/O, encodage)
    UnreadableSource,
    /// Payload rejeté par le normaliseur
    MalformedPayload,
    /// Géométrie d'un élément rejetée par le validateur
    ValidationFailure,
    /// Écriture refusée par le datastore
    StoreUnavailable,
    /// Délai par élément dépassé
    Timeout,
    /// Élément jamais démarré (import annulé)
    Cancelled,
}

/// Échec d'un élément
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Résultat d'un élément source
#[derive(Debug, Clone, Serialize)]
pub struct ItemOutcome {
    /// Chemin ou référence de l'élément
    pub reference: String,
    /// Index du lot (0-based)
    pub chunk: usize,
    pub success: bool,
    /// Nombre de features créées
    pub feature_count: usize,
    pub error: Option<ItemFailure>,
}

impl ItemOutcome {
    pub fn succeeded(reference: impl Into<String>, chunk: usize, feature_count: usize) -> Self {
        Self {
            reference: reference.into(),
            chunk,
            success: true,
            feature_count,
            error: None,
        }
    }

    pub fn failed(reference: impl Into<String>, chunk: usize, failure: ItemFailure) -> Self {
        Self {
            reference: reference.into(),
            chunk,
            success: false,
            feature_count: 0,
            error: Some(failure),
        }
    }

    /// Élément non démarré
    pub fn is_cancelled(&self) -> bool {
        matches!(&self.error, Some(f) if f.kind == FailureKind::Cancelled)
    }
}

/// Rapport complet d'un import par lots
#[derive(Debug, Clone, Serialize)]
pub struct BatchUploadOutcome {
    /// Résultats dans l'ordre des éléments source
    pub items: Vec<ItemOutcome>,
    /// Éléments effectivement démarrés
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Features créées sur l'ensemble des succès
    pub total_features: usize,
    /// Nombre de lots démarrés
    pub chunks: usize,
    /// Import interrompu par annulation
    pub cancelled: bool,
    /// Durée de l'import
    #[serde(rename = "duration_secs", serialize_with = "serialize_secs")]
    pub duration: Duration,
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl BatchUploadOutcome {
    /// Agrège les résultats par élément
    pub fn from_items(items: Vec<ItemOutcome>, chunks: usize, duration: Duration) -> Self {
        let mut outcome = Self {
            items,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            total_features: 0,
            chunks,
            cancelled: false,
            duration,
        };

        for item in &outcome.items {
            if item.is_cancelled() {
                outcome.cancelled = true;
                continue;
            }
            outcome.attempted += 1;
            if item.success {
                outcome.succeeded += 1;
                outcome.total_features += item.feature_count;
            } else {
                outcome.failed += 1;
            }
        }

        outcome
    }

    /// `succeeded / attempted` (0 si rien n'a été tenté)
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.attempted as f64
        }
    }

    pub fn status(&self) -> IngestStatus {
        match (self.succeeded, self.failed) {
            (0, _) => IngestStatus::Failed,
            (_, 0) => IngestStatus::Success,
            _ => IngestStatus::PartialSuccess,
        }
    }

    /// Échecs (éléments tentés uniquement)
    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.items
            .iter()
            .filter(|item| !item.success && !item.is_cancelled())
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("INGEST REPORT");
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status());
        println!("Duration: {:.2}s", self.duration.as_secs_f64());
        if self.cancelled {
            println!("Cancelled: yes");
        }

        println!("\n--- SUMMARY ---");
        println!(
            "Items: {} attempted, {} succeeded, {} failed ({:.1}%)",
            self.attempted,
            self.succeeded,
            self.failed,
            self.success_rate() * 100.0
        );
        println!(
            "Features: {} created in {} chunk(s)",
            self.total_features, self.chunks
        );

        let failures: Vec<_> = self.failures().collect();
        if !failures.is_empty() {
            println!("\n--- ERRORS ({}) ---", failures.len());
            for item in failures.iter().take(20) {
                if let Some(error) = &item.error {
                    println!(
                        "  {:?} [{}] {}",
                        error.kind, item.reference, error.message
                    );
                }
            }
            if failures.len() > 20 {
                println!("  ... and {} more", failures.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}/{} items succeeded, {} failed, {} features",
            self.succeeded, self.attempted, self.failed, self.total_features
        )
    }
}
