//! Shared harness for the integration suites
#![allow(dead_code)]

use crabdock::testing::{MemoryDock, MemoryMappingStore, MemoryPresence};
use crabdock::{DockEmbedConfig, EmbedAvClient, EmbedReconciler, MemoryDocument, ParticipantId};
use std::sync::Arc;

pub struct Harness {
    pub config: DockEmbedConfig,
    pub document: Arc<MemoryDocument>,
    pub dock: Arc<MemoryDock>,
    pub store: Arc<MemoryMappingStore>,
    pub presence: Arc<MemoryPresence>,
    pub client: Arc<EmbedAvClient>,
}

impl Harness {
    pub fn new(entries: &[(&str, &str)], active: &[&str]) -> Self {
        Self::build(DockEmbedConfig::default(), entries, active, false)
    }

    pub fn with_accessor(entries: &[(&str, &str)], active: &[&str]) -> Self {
        Self::build(DockEmbedConfig::default(), entries, active, true)
    }

    pub fn build(
        config: DockEmbedConfig,
        entries: &[(&str, &str)],
        active: &[&str],
        accessor: bool,
    ) -> Self {
        let document = Arc::new(MemoryDocument::new());
        let dock = Arc::new(
            MemoryDock::new(document.clone(), config.dock.clone()).with_accessor(accessor),
        );
        let store = Arc::new(MemoryMappingStore::with_entries(entries.iter().copied()));
        let presence = Arc::new(MemoryPresence::with_active(active.iter().copied()));
        let client = Arc::new(EmbedAvClient::new(
            config.clone(),
            document.clone(),
            dock.clone(),
            store.clone(),
            presence.clone(),
        ));
        Self {
            config,
            document,
            dock,
            store,
            presence,
            client,
        }
    }

    /// Harness that is already connected
    pub fn connected(entries: &[(&str, &str)], active: &[&str]) -> Self {
        let harness = Self::new(entries, active);
        harness.client.connect();
        harness
    }

    pub fn reconciler(&self) -> &EmbedReconciler {
        self.client.reconciler()
    }

    pub fn overlays(&self, id: &str) -> usize {
        self.reconciler().overlay_count(&pid(id))
    }
}

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id)
}
