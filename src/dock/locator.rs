//! Tile discovery
//!
//! Strategies run in order: the dock's own accessor first, then a structural
//! lookup by participant attribute. A missing tile is an ordinary answer.

use super::Dock;
use crate::config::DockConfig;
use crate::dom::{Document, NodeRef, Selector};
use crate::types::ParticipantId;
use std::sync::Arc;

/// Which discovery strategy produced a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateStrategy {
    HostAccessor,
    Structural,
}

/// A host tile found in the dock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRef {
    pub participant: ParticipantId,
    pub tile: NodeRef,
}

#[derive(Clone)]
pub struct TileLocator {
    document: Arc<dyn Document>,
    dock: Arc<dyn Dock>,
    config: DockConfig,
}

impl TileLocator {
    pub fn new(document: Arc<dyn Document>, dock: Arc<dyn Dock>, config: DockConfig) -> Self {
        Self {
            document,
            dock,
            config,
        }
    }

    fn tile_selector(&self) -> Selector {
        Selector::class(&self.config.tile_class).with_attribute(&self.config.participant_attribute)
    }

    fn usable(&self, node: Option<NodeRef>) -> Option<NodeRef> {
        node.filter(|n| self.document.is_connected(*n))
    }

    /// The participant's tile with the strategy that found it
    pub fn locate_tile(&self, id: &ParticipantId) -> Option<(NodeRef, LocateStrategy)> {
        if let Some(tile) = self.usable(self.dock.tile_for(id)) {
            return Some((tile, LocateStrategy::HostAccessor));
        }

        let selector = Selector::class(&self.config.tile_class)
            .with_attribute_value(&self.config.participant_attribute, id.as_str());
        self.document
            .query(None, &selector)
            .map(|tile| (tile, LocateStrategy::Structural))
    }

    pub fn find_tile(&self, id: &ParticipantId) -> Option<NodeRef> {
        self.locate_tile(id).map(|(tile, _)| tile)
    }

    pub fn find_video_surface(&self, id: &ParticipantId) -> Option<NodeRef> {
        if let Some(video) = self.usable(self.dock.video_surface_for(id)) {
            return Some(video);
        }
        self.find_tile(id).and_then(|tile| self.video_in(tile))
    }

    /// The participant's video surface, limited to `tile`.
    ///
    /// An accessor answer that lives outside the tile is ignored in favour of
    /// the tile's own surface.
    pub fn video_for(&self, id: &ParticipantId, tile: NodeRef) -> Option<NodeRef> {
        self.usable(self.dock.video_surface_for(id))
            .filter(|video| self.contains(tile, *video))
            .or_else(|| self.video_in(tile))
    }

    /// Whether `node` is `ancestor` or sits somewhere below it
    pub fn contains(&self, ancestor: NodeRef, node: NodeRef) -> bool {
        let mut current = Some(node);
        while let Some(candidate) = current {
            if candidate == ancestor {
                return true;
            }
            current = self.document.parent(candidate);
        }
        false
    }

    /// First video surface inside a tile
    pub fn video_in(&self, tile: NodeRef) -> Option<NodeRef> {
        self.document
            .query(Some(tile), &Selector::tag(&self.config.video_tag))
    }

    /// Every tile currently in the dock, in document order.
    ///
    /// Tiles with a blank participant attribute are skipped.
    pub fn enumerate(&self) -> Vec<TileRef> {
        self.document
            .query_all(None, &self.tile_selector())
            .into_iter()
            .filter_map(|tile| {
                let id = self
                    .document
                    .attribute(tile, &self.config.participant_attribute)?;
                let id = id.trim();
                (!id.is_empty()).then(|| TileRef {
                    participant: ParticipantId::from(id),
                    tile,
                })
            })
            .collect()
    }

    /// Nearest tile enclosing `node`, if any
    pub fn tile_containing(&self, node: NodeRef) -> Option<NodeRef> {
        let selector = self.tile_selector();
        let mut current = self.document.parent(node);
        while let Some(candidate) = current {
            if self.document.matches(candidate, &selector) {
                return Some(candidate);
            }
            current = self.document.parent(candidate);
        }
        None
    }

    /// Participant named by a tile
    pub fn participant_of(&self, tile: NodeRef) -> Option<ParticipantId> {
        self.document
            .attribute(tile, &self.config.participant_attribute)
            .map(|id| ParticipantId::from(id.trim()))
            .filter(|id| !id.as_str().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DockEmbedConfig;
    use crate::dom::MemoryDocument;
    use crate::testing::MemoryDock;

    fn setup(accessor: bool) -> (Arc<MemoryDocument>, Arc<MemoryDock>, TileLocator) {
        let config = DockEmbedConfig::default().dock;
        let document = Arc::new(MemoryDocument::new());
        let dock = Arc::new(MemoryDock::new(document.clone(), config.clone()).with_accessor(accessor));
        let locator = TileLocator::new(document.clone(), dock.clone(), config);
        (document, dock, locator)
    }

    #[test]
    fn test_structural_lookup() {
        let (_doc, dock, locator) = setup(false);
        let nodes = dock.add_tile("alice").unwrap();

        assert_eq!(
            locator.locate_tile(&"alice".into()),
            Some((nodes.tile, LocateStrategy::Structural))
        );
        assert_eq!(locator.find_video_surface(&"alice".into()), Some(nodes.video));
        assert_eq!(locator.find_tile(&"bob".into()), None);
    }

    #[test]
    fn test_accessor_is_preferred() {
        let (_doc, dock, locator) = setup(true);
        let nodes = dock.add_tile("alice").unwrap();

        assert_eq!(
            locator.locate_tile(&"alice".into()),
            Some((nodes.tile, LocateStrategy::HostAccessor))
        );
        assert_eq!(locator.find_video_surface(&"alice".into()), Some(nodes.video));
    }

    #[test]
    fn test_stale_accessor_result_falls_through() {
        let (doc, dock, locator) = setup(true);
        let nodes = dock.add_tile("alice").unwrap();
        doc.remove(nodes.tile);

        assert_eq!(locator.find_tile(&"alice".into()), None);
        assert_eq!(locator.find_video_surface(&"alice".into()), None);
    }

    #[test]
    fn test_enumerate_and_containment() {
        let (doc, dock, locator) = setup(false);
        let a = dock.add_tile("alice").unwrap();
        let b = dock.add_tile("bob").unwrap();
        doc.append_element(dock.root(), "div", &["camera-view"], &[("data-user", " ")])
            .unwrap();

        let tiles = locator.enumerate();
        let ids: Vec<_> = tiles.iter().map(|t| t.participant.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob"]);

        assert_eq!(locator.tile_containing(a.video), Some(a.tile));
        assert_eq!(locator.tile_containing(b.container), Some(b.tile));
        assert_eq!(locator.tile_containing(a.tile), None);
        assert_eq!(locator.participant_of(b.tile), Some("bob".into()));

        assert!(locator.contains(a.tile, a.video));
        assert!(locator.contains(a.tile, a.tile));
        assert!(!locator.contains(a.tile, b.video));
    }

    #[test]
    fn test_video_for_stays_inside_tile() {
        let (_doc, dock, locator) = setup(true);
        let a = dock.add_tile("alice").unwrap();
        let b = dock.add_tile("bob").unwrap();

        assert_eq!(locator.video_for(&"alice".into(), a.tile), Some(a.video));
        // the accessor answers with alice's surface, which is not in bob's tile
        assert_eq!(locator.video_for(&"alice".into(), b.tile), Some(b.video));
    }
}
