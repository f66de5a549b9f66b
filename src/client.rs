//! Host-facing A/V client
//!
//! The host talks to its A/V implementation through a fixed lifecycle and a
//! handful of per-participant queries. [`EmbedAvClient`] answers them without
//! capturing any devices: every participant with an effective binding gets the
//! shared placeholder stream, and the actual picture comes from the overlay.

use crate::config::DockEmbedConfig;
use crate::dock::Dock;
use crate::dom::{Document, NodeRef};
use crate::mapping::{MappingStore, PresenceSource};
use crate::media::{DummyStreamFactory, MediaHandle};
use crate::reconcile::{EmbedReconciler, PassHandle, VideoAttachment};
use crate::types::ParticipantId;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct EmbedAvClient {
    config: DockEmbedConfig,
    placeholder: Arc<DummyStreamFactory>,
    reconciler: EmbedReconciler,
    initialized: AtomicBool,
}

impl EmbedAvClient {
    pub fn new(
        config: DockEmbedConfig,
        document: Arc<dyn Document>,
        dock: Arc<dyn Dock>,
        store: Arc<dyn MappingStore>,
        presence: Arc<dyn PresenceSource>,
    ) -> Self {
        let placeholder = if config.dummy_stream == DockEmbedConfig::default().dummy_stream {
            DummyStreamFactory::shared()
        } else {
            Arc::new(DummyStreamFactory::new(config.dummy_stream.clone()))
        };
        Self::with_placeholder(config, document, dock, store, presence, placeholder)
    }

    /// Build a client around an existing placeholder factory
    pub fn with_placeholder(
        config: DockEmbedConfig,
        document: Arc<dyn Document>,
        dock: Arc<dyn Dock>,
        store: Arc<dyn MappingStore>,
        presence: Arc<dyn PresenceSource>,
        placeholder: Arc<DummyStreamFactory>,
    ) -> Self {
        let reconciler = EmbedReconciler::new(
            &config,
            document,
            dock,
            store,
            presence,
            placeholder.clone(),
        );
        Self {
            config,
            placeholder,
            reconciler,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DockEmbedConfig {
        &self.config
    }

    pub fn reconciler(&self) -> &EmbedReconciler {
        &self.reconciler
    }

    /// Prepare the placeholder stream. Safe to call more than once.
    pub fn initialize(&self) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return;
        }
        let handle = self.placeholder.get();
        log::info!(
            "Embed client initialized (placeholder {}x{} @ {}fps)",
            handle.dimensions().0,
            handle.dimensions().1,
            handle.fps()
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Start serving embeds. Always succeeds.
    pub fn connect(&self) -> bool {
        self.initialize();
        self.reconciler.set_connected(true);
        log::info!("Embed client connected");
        true
    }

    /// Stop serving embeds and strip every overlay in one pass
    pub fn disconnect(&self) -> bool {
        self.reconciler.set_connected(false);
        let report = self.reconciler.reconcile_now();
        log::info!(
            "Embed client disconnected ({} overlay(s) removed, {} retry task(s) cancelled)",
            report.detached.len(),
            report.cancelled.len()
        );
        true
    }

    pub fn is_connected(&self) -> bool {
        self.reconciler.is_connected()
    }

    /// The stream mapping changed
    pub fn on_settings_changed(&self) -> PassHandle {
        self.reconciler.reconcile(true)
    }

    pub fn refresh_all(&self, rerender_dock: bool) -> PassHandle {
        self.reconciler.reconcile(rerender_dock)
    }

    /// Participants with an effective binding; empty while disconnected
    pub fn connected_participants(&self) -> BTreeSet<ParticipantId> {
        if !self.is_connected() {
            return BTreeSet::new();
        }
        self.reconciler.view().connected_participants()
    }

    /// The placeholder stream for participants with an effective binding
    pub fn media_handle_for(&self, id: &ParticipantId) -> Option<MediaHandle> {
        if self.is_video_enabled(id) {
            Some(self.placeholder.get())
        } else {
            None
        }
    }

    /// Audio levels are never routed through the host
    pub fn levels_handle_for(&self, _id: &ParticipantId) -> Option<MediaHandle> {
        None
    }

    pub fn is_video_enabled(&self, id: &ParticipantId) -> bool {
        self.is_connected() && self.reconciler.view().effective_url(id).is_some()
    }

    pub fn is_audio_enabled(&self, _id: &ParticipantId) -> bool {
        false
    }

    /// Embedded participants may always show video, whatever the host's permission says
    pub fn can_user_share_video(&self, id: &ParticipantId, host_allows: bool) -> bool {
        host_allows || self.is_video_enabled(id)
    }

    pub fn toggle_audio(&self, _enable: bool) {}

    pub fn toggle_video(&self, _enable: bool) {}

    pub fn toggle_broadcast(&self, _broadcast: bool) {}

    pub fn update_local_stream(&self) {}

    pub fn set_user_audio(&self, _id: &ParticipantId, _element: NodeRef) {}

    /// Host-driven attach of one participant's video surface
    pub fn attach_video(
        &self,
        id: &ParticipantId,
        video: NodeRef,
        source: Option<&MediaHandle>,
    ) -> VideoAttachment {
        self.reconciler.attach_video(id, video, source)
    }
}
