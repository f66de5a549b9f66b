//! Desired-vs-observed reconciliation
//!
//! Every host trigger ends up in [`EmbedReconciler::reconcile`]. A pass
//! re-derives the desired overlays from the mapping view, walks every tile the
//! dock currently shows, and applies only the changes needed. Nothing is
//! remembered between passes except pending retry tasks, so running a stale
//! continuation after a newer pass is harmless.

use super::overlay::{AttachChange, OverlayPainter, SourcePolicy};
use super::retry::{AttachAttempt, RetryScheduler, RetryTarget};
use crate::config::DockEmbedConfig;
use crate::dock::{Dock, TileLocator, TileRef};
use crate::dom::{Document, NodeRef};
use crate::embed_url::EmbedUrlBuilder;
use crate::mapping::{MappingStore, PresenceSource, StreamMappingView};
use crate::media::{DummyStreamFactory, MediaHandle};
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassReport {
    pub pass: u64,
    /// Participants with an effective binding
    pub desired: usize,
    pub attached: Vec<ParticipantId>,
    pub updated: Vec<ParticipantId>,
    pub detached: Vec<ParticipantId>,
    pub scheduled: Vec<ParticipantId>,
    pub cancelled: Vec<ParticipantId>,
}

impl PassReport {
    /// Whether the pass changed nothing
    pub fn is_noop(&self) -> bool {
        self.attached.is_empty()
            && self.updated.is_empty()
            && self.detached.is_empty()
            && self.scheduled.is_empty()
            && self.cancelled.is_empty()
    }
}

/// A pass that ran inline or was deferred behind a dock re-render
#[derive(Debug)]
pub enum PassHandle {
    Completed(PassReport),
    Deferred(JoinHandle<PassReport>),
}

impl PassHandle {
    /// Wait for the pass; `None` if the deferred task was cancelled
    pub async fn wait(self) -> Option<PassReport> {
        match self {
            PassHandle::Completed(report) => Some(report),
            PassHandle::Deferred(handle) => handle.await.ok(),
        }
    }
}

/// Outcome of a host-driven single-video attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoAttachment {
    Attached(AttachChange),
    /// The surface is not in the dock yet; a retry task will pick it up
    Deferred,
    /// Another tile holds the participant's overlay; the surface was left alone
    Superseded,
    Detached,
}

struct ReconcilerInner {
    document: Arc<dyn Document>,
    dock: Arc<dyn Dock>,
    view: StreamMappingView,
    builder: EmbedUrlBuilder,
    locator: TileLocator,
    painter: OverlayPainter,
    placeholder: Arc<DummyStreamFactory>,
    retries: RetryScheduler,
    settle_delay: Duration,
    connected: AtomicBool,
    passes: AtomicU64,
    pass_lock: Mutex<()>,
}

impl ReconcilerInner {
    fn lock_pass(&self) -> MutexGuard<'_, ()> {
        self.pass_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn desired(&self) -> BTreeMap<ParticipantId, String> {
        if !self.connected.load(Ordering::SeqCst) {
            return BTreeMap::new();
        }
        self.view
            .effective_bindings()
            .into_iter()
            .map(|binding| {
                let url = self.builder.build(&binding.raw_url, &binding.participant_id);
                (binding.participant_id, url)
            })
            .collect()
    }

    /// Remove an overlay no claimed tile holds.
    ///
    /// The video beside it is restored unless another overlay for the same
    /// participant still covers it.
    fn discard_overlay(&self, overlay: NodeRef, owner: Option<&ParticipantId>, placeholder: &MediaHandle) {
        let anchor = self.document.parent(overlay);
        self.painter.remove_overlay(overlay);
        let (Some(id), Some(anchor)) = (owner, anchor) else {
            return;
        };
        let Some(video) = self.locator.video_in(anchor) else {
            return;
        };
        let covered = self
            .document
            .parent(video)
            .map_or(false, |parent| !self.painter.overlays_in(parent, id).is_empty());
        if !covered {
            self.painter.detach(id, None, Some(video), placeholder);
        }
    }

    /// Drop `id`'s overlays that sit outside `scope`
    fn discard_strays(&self, id: &ParticipantId, scope: NodeRef, placeholder: &MediaHandle) {
        for (overlay, owner) in self.painter.all_overlays() {
            if owner.as_ref() == Some(id)
                && self.document.is_connected(overlay)
                && !self.locator.contains(scope, overlay)
            {
                log::debug!("Removing stray overlay for {}", id);
                self.discard_overlay(overlay, Some(id), placeholder);
            }
        }
    }

    fn desired_url(&self, id: &ParticipantId) -> Option<String> {
        if !self.connected.load(Ordering::SeqCst) {
            return None;
        }
        self.view
            .effective_url(id)
            .map(|raw| self.builder.build(&raw, id))
    }
}

impl RetryTarget for ReconcilerInner {
    fn attempt(&self, id: &ParticipantId) -> AttachAttempt {
        let _pass = self.lock_pass();

        let Some(url) = self.desired_url(id) else {
            return AttachAttempt::NotWanted;
        };
        let Some(tile) = self.locator.find_tile(id) else {
            return AttachAttempt::TileMissing;
        };
        let video = self.locator.video_for(id, tile);
        let placeholder = self.placeholder.get();

        match self.painter.attach(id, Some(tile), video, &url, &placeholder, SourcePolicy::KeepExisting) {
            Ok(_) => {
                self.discard_strays(id, tile, &placeholder);
                AttachAttempt::Attached
            }
            Err(e) => {
                log::debug!("Late attach for {} failed, will retry: {}", id, e);
                AttachAttempt::TileMissing
            }
        }
    }
}

/// The single authority over which overlays exist
#[derive(Clone)]
pub struct EmbedReconciler {
    inner: Arc<ReconcilerInner>,
}

impl EmbedReconciler {
    pub fn new(
        config: &DockEmbedConfig,
        document: Arc<dyn Document>,
        dock: Arc<dyn Dock>,
        store: Arc<dyn MappingStore>,
        presence: Arc<dyn PresenceSource>,
        placeholder: Arc<DummyStreamFactory>,
    ) -> Self {
        let view = StreamMappingView::new(store, presence, config.binding.policy);
        let locator = TileLocator::new(document.clone(), dock.clone(), config.dock.clone());
        let painter = OverlayPainter::new(document.clone(), config.overlay.clone());

        Self {
            inner: Arc::new(ReconcilerInner {
                document,
                dock,
                view,
                builder: EmbedUrlBuilder::new(&config.embed),
                locator,
                painter,
                placeholder,
                retries: RetryScheduler::new(&config.retry),
                settle_delay: Duration::from_millis(config.dock.settle_delay_ms),
                connected: AtomicBool::new(false),
                passes: AtomicU64::new(0),
                pass_lock: Mutex::new(()),
            }),
        }
    }

    /// While disconnected the desired set is empty
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn view(&self) -> &StreamMappingView {
        &self.inner.view
    }

    pub fn locator(&self) -> &TileLocator {
        &self.inner.locator
    }

    pub fn painter(&self) -> &OverlayPainter {
        &self.inner.painter
    }

    pub fn retries(&self) -> &RetryScheduler {
        &self.inner.retries
    }

    pub fn placeholder(&self) -> MediaHandle {
        self.inner.placeholder.get()
    }

    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    /// Participant -> embed URL for every effective binding
    pub fn desired(&self) -> BTreeMap<ParticipantId, String> {
        self.inner.desired()
    }

    /// Run a pass, optionally behind a dock re-render.
    ///
    /// With `force_dock_refresh` the dock is asked to re-render and the pass
    /// waits one scheduling tick (or the configured settle delay) before
    /// looking at the DOM.
    pub fn reconcile(&self, force_dock_refresh: bool) -> PassHandle {
        if !force_dock_refresh {
            return PassHandle::Completed(self.reconcile_now());
        }

        self.inner.dock.request_rerender();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => return PassHandle::Completed(self.reconcile_now()),
        };

        let this = self.clone();
        let delay = self.inner.settle_delay;
        PassHandle::Deferred(runtime.spawn(async move {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            this.reconcile_now()
        }))
    }

    /// One full pass over the DOM as it is right now
    pub fn reconcile_now(&self) -> PassReport {
        let inner = &self.inner;
        let _pass = inner.lock_pass();

        let desired = inner.desired();
        let placeholder = inner.placeholder.get();
        let mut report = PassReport {
            pass: inner.passes.fetch_add(1, Ordering::SeqCst) + 1,
            desired: desired.len(),
            ..PassReport::default()
        };

        // The tile each desired participant resolves to is the only one that
        // may hold its overlay. Claims are recorded after a successful attach.
        let mut resolved: HashMap<ParticipantId, NodeRef> = HashMap::new();
        let mut claimed: HashMap<ParticipantId, NodeRef> = HashMap::new();
        for (participant, url) in &desired {
            let Some(tile) = inner.locator.find_tile(participant) else {
                continue;
            };
            resolved.insert(participant.clone(), tile);
            let video = inner.locator.video_for(participant, tile);
            match inner.painter.attach(
                participant,
                Some(tile),
                video,
                url,
                &placeholder,
                SourcePolicy::KeepExisting,
            ) {
                Ok(change) => {
                    claimed.insert(participant.clone(), tile);
                    match change {
                        AttachChange::Created => report.attached.push(participant.clone()),
                        AttachChange::Updated => report.updated.push(participant.clone()),
                        AttachChange::Unchanged => {}
                    }
                }
                Err(e) => log::debug!("Could not attach overlay for {}: {}", participant, e),
            }
        }

        for TileRef { participant, tile } in inner.locator.enumerate() {
            if let Some(&owned) = resolved.get(&participant) {
                if inner.locator.contains(owned, tile) || inner.locator.contains(tile, owned) {
                    continue;
                }
            }
            let video = inner.locator.video_in(tile);
            if inner.painter.detach(&participant, Some(tile), video, &placeholder)
                && !report.detached.contains(&participant)
            {
                report.detached.push(participant);
            }
        }

        for (overlay, owner) in inner.painter.all_overlays() {
            if !inner.document.is_connected(overlay) {
                continue;
            }
            let keep = owner
                .as_ref()
                .and_then(|id| claimed.get(id))
                .map_or(false, |&tile| inner.locator.contains(tile, overlay));
            if keep {
                continue;
            }
            inner.discard_overlay(overlay, owner.as_ref(), &placeholder);
            if let Some(id) = owner {
                if !report.detached.contains(&id) {
                    report.detached.push(id);
                }
            }
        }

        for id in inner.retries.pending() {
            if !desired.contains_key(&id) {
                inner.retries.cancel(&id);
                report.cancelled.push(id);
            } else if claimed.contains_key(&id) {
                inner.retries.resolve(&id);
            }
        }

        for id in desired.keys() {
            if !claimed.contains_key(id) && inner.retries.schedule(id, self.inner.clone()) {
                report.scheduled.push(id.clone());
            }
        }

        if report.is_noop() {
            log::trace!("Pass {} converged with no changes", report.pass);
        } else {
            log::debug!(
                "Pass {}: desired={} attached={:?} updated={:?} detached={:?} scheduled={:?} cancelled={:?}",
                report.pass,
                report.desired,
                report.attached,
                report.updated,
                report.detached,
                report.scheduled,
                report.cancelled
            );
        }
        report
    }

    /// Attach the participant's overlay using tile discovery
    pub fn attach_tile(&self, id: &ParticipantId) -> AttachAttempt {
        self.inner.attempt(id)
    }

    /// Host-driven attach of a specific video surface.
    ///
    /// A surface the host has not inserted into the dock yet is handed to the
    /// retry scheduler.
    pub fn attach_video(
        &self,
        id: &ParticipantId,
        video: NodeRef,
        source: Option<&MediaHandle>,
    ) -> VideoAttachment {
        let inner = &self.inner;
        let _pass = inner.lock_pass();
        let placeholder = inner.placeholder.get();

        let Some(url) = inner.desired_url(id) else {
            let scope = inner
                .locator
                .tile_containing(video)
                .or_else(|| inner.document.parent(video));
            inner.painter.detach(id, scope, Some(video), &placeholder);
            inner.retries.cancel(id);
            return VideoAttachment::Detached;
        };

        if !inner.document.is_connected(video) || inner.document.parent(video).is_none() {
            inner.retries.schedule(id, self.inner.clone());
            return VideoAttachment::Deferred;
        }

        let tile = match inner.locator.find_tile(id) {
            Some(owned) if !inner.locator.contains(owned, video) => {
                log::debug!("{}'s overlay belongs to another tile; leaving this surface alone", id);
                return VideoAttachment::Superseded;
            }
            Some(owned) => Some(owned),
            None => inner.locator.tile_containing(video),
        };

        let (source, policy) = match source {
            Some(source) => (source.clone(), SourcePolicy::Replace),
            None => (placeholder.clone(), SourcePolicy::KeepExisting),
        };
        match inner.painter.attach(id, tile, Some(video), &url, &source, policy) {
            Ok(change) => {
                if let Some(scope) = tile.or_else(|| inner.document.parent(video)) {
                    inner.discard_strays(id, scope, &placeholder);
                }
                inner.retries.resolve(id);
                VideoAttachment::Attached(change)
            }
            Err(e) => {
                log::debug!("Could not attach overlay for {} yet: {}", id, e);
                inner.retries.schedule(id, self.inner.clone());
                VideoAttachment::Deferred
            }
        }
    }

    /// Frame address currently shown on the participant's tile
    pub fn overlay_url(&self, id: &ParticipantId) -> Option<String> {
        let tile = self.inner.locator.find_tile(id)?;
        self.inner.painter.frame_url(tile, id)
    }

    /// Overlay containers for the participant anywhere in the dock
    pub fn overlay_count(&self, id: &ParticipantId) -> usize {
        self.inner
            .painter
            .all_overlays()
            .into_iter()
            .filter(|(_, owner)| owner.as_ref() == Some(id))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::MemoryDocument;
    use crate::testing::{MemoryDock, MemoryMappingStore, MemoryPresence};

    struct Fixture {
        document: Arc<MemoryDocument>,
        dock: Arc<MemoryDock>,
        store: Arc<MemoryMappingStore>,
        presence: Arc<MemoryPresence>,
        reconciler: EmbedReconciler,
    }

    fn fixture() -> Fixture {
        let config = DockEmbedConfig::default();
        let document = Arc::new(MemoryDocument::new());
        let dock = Arc::new(MemoryDock::new(document.clone(), config.dock.clone()));
        let store = Arc::new(MemoryMappingStore::with_entries([("alice", "https://vdo.example/?view=a")]));
        let presence = Arc::new(MemoryPresence::with_active(["alice"]));
        let placeholder = Arc::new(DummyStreamFactory::new(config.dummy_stream.clone()));
        let reconciler = EmbedReconciler::new(
            &config,
            document.clone(),
            dock.clone(),
            store.clone(),
            presence.clone(),
            placeholder,
        );
        reconciler.set_connected(true);
        Fixture {
            document,
            dock,
            store,
            presence,
            reconciler,
        }
    }

    #[test]
    fn test_pass_attaches_then_converges() {
        let f = fixture();
        f.dock.add_tile("alice").unwrap();

        let first = f.reconciler.reconcile_now();
        assert_eq!(first.attached, vec![ParticipantId::from("alice")]);
        assert_eq!(f.reconciler.overlay_count(&"alice".into()), 1);

        let before = f.document.mutation_count();
        let second = f.reconciler.reconcile_now();
        assert!(second.is_noop());
        assert_eq!(f.document.mutation_count(), before);
        assert_eq!(second.pass, 2);
    }

    #[test]
    fn test_disconnected_wants_nothing() {
        let f = fixture();
        f.dock.add_tile("alice").unwrap();
        f.reconciler.reconcile_now();

        f.reconciler.set_connected(false);
        let report = f.reconciler.reconcile_now();
        assert_eq!(report.desired, 0);
        assert_eq!(report.detached, vec![ParticipantId::from("alice")]);
        assert_eq!(f.reconciler.overlay_count(&"alice".into()), 0);
    }

    #[test]
    fn test_inactive_participant_is_detached() {
        let f = fixture();
        let tile = f.dock.add_tile("alice").unwrap();
        f.reconciler.reconcile_now();
        assert_eq!(
            f.document.src_object(tile.video),
            Some(f.reconciler.placeholder())
        );

        f.presence.set_active("alice", false);
        f.reconciler.reconcile_now();
        assert_eq!(f.reconciler.overlay_count(&"alice".into()), 0);
        assert_eq!(f.document.src_object(tile.video), None);
    }

    #[test]
    fn test_url_change_updates_frame_in_place() {
        let f = fixture();
        f.dock.add_tile("alice").unwrap();
        f.reconciler.reconcile_now();

        f.store.set("alice", "https://vdo.example/?view=b");
        let report = f.reconciler.reconcile_now();
        assert_eq!(report.updated, vec![ParticipantId::from("alice")]);
        let url = f.reconciler.overlay_url(&"alice".into()).unwrap();
        assert!(url.starts_with("https://vdo.example/?view=b"));
        assert!(url.contains("label=alice"));
    }

    #[test]
    fn test_missing_tile_without_runtime_schedules_nothing() {
        let f = fixture();
        let report = f.reconciler.reconcile_now();
        assert_eq!(report.desired, 1);
        assert!(report.scheduled.is_empty());
        assert!(f.reconciler.retries().pending().is_empty());
    }
}
