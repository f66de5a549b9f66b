//! Overlay markup on a single tile
//!
//! The container and frame created here are the only nodes the core owns.
//! Host nodes are touched in three narrow ways: the video surface's source
//! and hidden class, and the anchor's positioning context.

use crate::config::OverlayConfig;
use crate::dom::{Document, NodeRef, Selector};
use crate::errors::EmbedError;
use crate::media::MediaHandle;
use crate::types::ParticipantId;
use std::sync::Arc;

/// What attaching did to a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachChange {
    Created,
    Updated,
    Unchanged,
}

/// How to treat a video surface that already has a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourcePolicy {
    /// Only fill an empty source
    KeepExisting,
    /// Replace any source that differs
    Replace,
}

#[derive(Clone)]
pub struct OverlayPainter {
    document: Arc<dyn Document>,
    config: OverlayConfig,
}

impl OverlayPainter {
    pub fn new(document: Arc<dyn Document>, config: OverlayConfig) -> Self {
        Self { document, config }
    }

    pub fn selector(&self, id: Option<&ParticipantId>) -> Selector {
        let base = Selector::class(&self.config.container_class);
        match id {
            Some(id) => base.with_attribute_value(&self.config.participant_attribute, id.as_str()),
            None => base,
        }
    }

    /// Overlay containers for `id` below `scope`
    pub fn overlays_in(&self, scope: NodeRef, id: &ParticipantId) -> Vec<NodeRef> {
        self.document.query_all(Some(scope), &self.selector(Some(id)))
    }

    /// Every overlay container in the document with the participant it names
    pub fn all_overlays(&self) -> Vec<(NodeRef, Option<ParticipantId>)> {
        self.document
            .query_all(None, &self.selector(None))
            .into_iter()
            .map(|node| {
                let id = self
                    .document
                    .attribute(node, &self.config.participant_attribute)
                    .map(ParticipantId::from);
                (node, id)
            })
            .collect()
    }

    /// Frame address of the participant's overlay under `scope`
    pub fn frame_url(&self, scope: NodeRef, id: &ParticipantId) -> Option<String> {
        let container = self.overlays_in(scope, id).into_iter().next()?;
        let frame = self
            .document
            .query(Some(container), &Selector::tag(&self.config.frame_tag))?;
        self.document.attribute(frame, "src")
    }

    fn prepare_video(&self, video: NodeRef, source: &MediaHandle, policy: SourcePolicy) {
        let needs_source = match (self.document.src_object(video), policy) {
            (None, _) => true,
            (Some(current), SourcePolicy::Replace) => current != *source,
            (Some(_), SourcePolicy::KeepExisting) => false,
        };
        if needs_source {
            self.document.set_src_object(video, Some(source));
            if let Err(e) = self.document.play(video) {
                log::debug!("Ignoring playback failure on {}: {}", video, e);
            }
        }
        self.document.add_class(video, &self.config.hidden_video_class);
    }

    fn ensure_positioned(&self, anchor: NodeRef) {
        let position = self.document.style_property(anchor, "position");
        if matches!(position.as_deref(), None | Some("static")) {
            self.document.set_style_property(anchor, "position", "relative");
        }
    }

    fn create_frame(&self, url: &str) -> NodeRef {
        let doc = &self.document;
        let frame = doc.create_element(&self.config.frame_tag);
        doc.set_attribute(frame, "allow", &self.config.frame_allow);
        doc.set_attribute(frame, "allowfullscreen", "");
        doc.set_attribute(frame, "referrerpolicy", &self.config.referrer_policy);
        doc.set_style_property(frame, "width", "100%");
        doc.set_style_property(frame, "height", "100%");
        doc.set_style_property(frame, "border", "0");
        doc.set_style_property(frame, "pointer-events", "none");
        doc.set_attribute(frame, "src", url);
        frame
    }

    fn create_overlay(&self, anchor: NodeRef, id: &ParticipantId, url: &str) -> Result<NodeRef, EmbedError> {
        let doc = &self.document;
        let container = doc.create_element("div");
        doc.add_class(container, &self.config.container_class);
        doc.set_attribute(container, &self.config.participant_attribute, id.as_str());
        doc.set_style_property(container, "position", "absolute");
        doc.set_style_property(container, "inset", "0");
        doc.set_style_property(container, "overflow", "hidden");
        doc.set_style_property(container, "pointer-events", "none");

        let frame = self.create_frame(url);
        doc.append_child(container, frame)?;
        doc.append_child(anchor, container)?;
        Ok(container)
    }

    /// Make sure `id`'s overlay covers the tile and shows `url`.
    ///
    /// The anchor is the video surface's parent, or the tile itself when the
    /// tile has no video surface.
    pub fn attach(
        &self,
        id: &ParticipantId,
        tile: Option<NodeRef>,
        video: Option<NodeRef>,
        url: &str,
        source: &MediaHandle,
        policy: SourcePolicy,
    ) -> Result<AttachChange, EmbedError> {
        let anchor = video
            .and_then(|v| self.document.parent(v))
            .or(tile)
            .ok_or_else(|| EmbedError::Dom(format!("no anchor for {}'s overlay", id)))?;

        if let Some(video) = video {
            self.prepare_video(video, source, policy);
        }
        self.ensure_positioned(anchor);

        let mut existing = self.overlays_in(tile.unwrap_or(anchor), id);
        if existing.is_empty() {
            self.create_overlay(anchor, id, url)?;
            return Ok(AttachChange::Created);
        }

        let container = existing.remove(0);
        let mut change = AttachChange::Unchanged;
        for extra in existing {
            self.document.remove(extra);
            change = AttachChange::Updated;
        }

        if self.document.parent(container) != Some(anchor) {
            self.document.append_child(anchor, container)?;
            change = AttachChange::Updated;
        }

        match self
            .document
            .query(Some(container), &Selector::tag(&self.config.frame_tag))
        {
            Some(frame) => {
                if self.document.attribute(frame, "src").as_deref() != Some(url) {
                    self.document.set_attribute(frame, "src", url);
                    change = AttachChange::Updated;
                }
            }
            None => {
                let frame = self.create_frame(url);
                self.document.append_child(container, frame)?;
                change = AttachChange::Updated;
            }
        }

        Ok(change)
    }

    /// Remove `id`'s overlays under `scope` and restore the video surface.
    ///
    /// Only a source equal to `placeholder` is cleared; anything else was
    /// assigned by the host. Returns whether anything changed.
    pub fn detach(
        &self,
        id: &ParticipantId,
        scope: Option<NodeRef>,
        video: Option<NodeRef>,
        placeholder: &MediaHandle,
    ) -> bool {
        let mut changed = false;

        if let Some(scope) = scope {
            for overlay in self.overlays_in(scope, id) {
                self.document.remove(overlay);
                changed = true;
            }
        }

        if let Some(video) = video {
            if self.document.has_class(video, &self.config.hidden_video_class) {
                self.document
                    .remove_class(video, &self.config.hidden_video_class);
                changed = true;
            }
            if self.document.src_object(video).as_ref() == Some(placeholder) {
                self.document.set_src_object(video, None);
                changed = true;
            }
        }

        changed
    }

    pub fn remove_overlay(&self, overlay: NodeRef) {
        self.document.remove(overlay);
    }
}
