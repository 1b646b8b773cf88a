//! Événements émis après chaque écriture réussie
//!
//! La diffusion (messagerie, temps réel) est un collaborateur externe:
//! le stockage se contente de notifier un observateur injecté.

use geofeature::{CollectionId, FeatureId};
use tracing::info;

/// Écriture réussie sur le stockage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    CollectionCreated(CollectionId),
    CollectionUpdated(CollectionId),
    CollectionDeleted(CollectionId),
    FeaturesCreated {
        collection_id: CollectionId,
        count: usize,
    },
    FeatureUpdated(FeatureId),
    FeatureDeleted(FeatureId),
}

/// Observateur des écritures
///
/// Appelé hors du chemin d'écriture, une fois l'écriture validée.
pub trait StoreObserver: Send + Sync {
    fn on_event(&self, event: &StoreEvent);
}

/// Observateur qui ignore tout (défaut)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StoreObserver for NoopObserver {
    fn on_event(&self, _event: &StoreEvent) {}
}

/// Observateur qui journalise les événements
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl StoreObserver for TracingObserver {
    fn on_event(&self, event: &StoreEvent) {
        info!(event = ?event, "Store write");
    }
}
