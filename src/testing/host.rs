use crate::config::DockConfig;
use crate::dock::Dock;
use crate::dom::{Document, MemoryDocument, NodeRef};
use crate::errors::EmbedError;
use crate::mapping::{ChangeHandler, MappingStore, PresenceSource};
use crate::types::{ParticipantId, StreamMap};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// Settings store holding the participant -> URL mapping in memory
#[derive(Default)]
pub struct MemoryMappingStore {
    map: RwLock<StreamMap>,
    handlers: Mutex<Vec<ChangeHandler>>,
    unreadable: AtomicBool,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<ParticipantId>,
        V: AsRef<str>,
    {
        Self {
            map: RwLock::new(StreamMap::from_entries(entries)),
            ..Self::default()
        }
    }

    /// Replace the whole mapping and notify subscribers
    pub fn set_all(&self, map: StreamMap) {
        if let Ok(mut current) = self.map.write() {
            *current = map;
        }
        self.notify();
    }

    pub fn set(&self, id: impl Into<ParticipantId>, url: impl Into<String>) {
        if let Ok(mut current) = self.map.write() {
            current.insert(id.into(), url.into());
        }
        self.notify();
    }

    pub fn remove(&self, id: &ParticipantId) {
        if let Ok(mut current) = self.map.write() {
            current.remove(id);
        }
        self.notify();
    }

    /// Update the mapping without firing change handlers
    pub fn set_silently(&self, map: StreamMap) {
        if let Ok(mut current) = self.map.write() {
            *current = map;
        }
    }

    /// Simulate a store that cannot be read right now
    pub fn set_unreadable(&self, unreadable: bool) {
        self.unreadable.store(unreadable, Ordering::SeqCst);
    }

    fn notify(&self) {
        let handlers = self.handlers.lock().unwrap_or_else(|e| e.into_inner());
        for handler in handlers.iter() {
            handler();
        }
    }

    fn check_readable(&self) -> Result<(), EmbedError> {
        if self.unreadable.load(Ordering::SeqCst) {
            return Err(EmbedError::StoreUnavailable(
                "settings are not readable yet".to_string(),
            ));
        }
        Ok(())
    }
}

impl MappingStore for MemoryMappingStore {
    fn get(&self, id: &ParticipantId) -> Result<Option<String>, EmbedError> {
        self.check_readable()?;
        let map = self
            .map
            .read()
            .map_err(|e| EmbedError::StoreUnavailable(e.to_string()))?;
        Ok(map.get(id).map(str::to_string))
    }

    fn get_all(&self) -> Result<StreamMap, EmbedError> {
        self.check_readable()?;
        let map = self
            .map
            .read()
            .map_err(|e| EmbedError::StoreUnavailable(e.to_string()))?;
        Ok(map.clone())
    }

    fn subscribe(&self, handler: ChangeHandler) -> bool {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
        true
    }
}

/// Presence flags keyed by participant
#[derive(Default)]
pub struct MemoryPresence {
    active: RwLock<HashSet<ParticipantId>>,
}

impl MemoryPresence {
    pub fn with_active<I, K>(ids: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<ParticipantId>,
    {
        Self {
            active: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn set_active(&self, id: impl Into<ParticipantId>, active: bool) {
        if let Ok(mut set) = self.active.write() {
            let id = id.into();
            if active {
                set.insert(id);
            } else {
                set.remove(&id);
            }
        }
    }
}

impl PresenceSource for MemoryPresence {
    fn is_active(&self, id: &ParticipantId) -> bool {
        self.active
            .read()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }
}

/// Nodes making up one rendered host tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileNodes {
    pub tile: NodeRef,
    pub container: NodeRef,
    pub video: NodeRef,
}

/// Camera dock rendering one tile per roster entry into a [`MemoryDocument`].
///
/// Tile markup: `div.<tile_class>[<participant_attribute>=id] > div.video-container > video`.
pub struct MemoryDock {
    document: Arc<MemoryDocument>,
    config: DockConfig,
    root: NodeRef,
    roster: Mutex<Vec<ParticipantId>>,
    tiles: Mutex<BTreeMap<ParticipantId, TileNodes>>,
    rerenders: AtomicUsize,
    accessor: bool,
}

impl MemoryDock {
    pub fn new(document: Arc<MemoryDocument>, config: DockConfig) -> Self {
        let root = document.create_element("div");
        document.set_attribute(root, "id", "camera-views");
        if let Err(e) = document.append_child(document.body(), root) {
            log::warn!("Failed to mount dock root: {}", e);
        }
        Self {
            document,
            config,
            root,
            roster: Mutex::new(Vec::new()),
            tiles: Mutex::new(BTreeMap::new()),
            rerenders: AtomicUsize::new(0),
            accessor: false,
        }
    }

    /// Expose `tile_for` / `video_surface_for` accessors
    pub fn with_accessor(mut self, enabled: bool) -> Self {
        self.accessor = enabled;
        self
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn document(&self) -> &Arc<MemoryDocument> {
        &self.document
    }

    fn render_tile(&self, id: &ParticipantId) -> Result<TileNodes, EmbedError> {
        let doc = &self.document;
        let tile = doc.append_element(
            self.root,
            "div",
            &[self.config.tile_class.as_str()],
            &[(self.config.participant_attribute.as_str(), id.as_str())],
        )?;
        let container = doc.append_element(tile, "div", &["video-container"], &[])?;
        let video = doc.append_element(container, &self.config.video_tag, &["user-camera"], &[])?;
        Ok(TileNodes {
            tile,
            container,
            video,
        })
    }

    /// Render a tile now and add the participant to the roster
    pub fn add_tile(&self, id: impl Into<ParticipantId>) -> Result<TileNodes, EmbedError> {
        let id = id.into();
        let nodes = self.render_tile(&id)?;
        {
            let mut roster = self.roster.lock().unwrap_or_else(|e| e.into_inner());
            if !roster.contains(&id) {
                roster.push(id.clone());
            }
        }
        self.tiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, nodes);
        Ok(nodes)
    }

    /// Drop the participant's tile and roster entry
    pub fn remove_tile(&self, id: &ParticipantId) {
        self.roster
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|r| r != id);
        let removed = self
            .tiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id);
        if let Some(nodes) = removed {
            self.document.remove(nodes.tile);
        }
    }

    /// Change who the next render shows
    pub fn set_roster<I, K>(&self, ids: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<ParticipantId>,
    {
        *self.roster.lock().unwrap_or_else(|e| e.into_inner()) =
            ids.into_iter().map(Into::into).collect();
    }

    pub fn tile(&self, id: &ParticipantId) -> Option<TileNodes> {
        self.tiles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .copied()
    }

    pub fn rerender_count(&self) -> usize {
        self.rerenders.load(Ordering::SeqCst)
    }
}

impl Dock for MemoryDock {
    /// Tear down every tile and render the roster from scratch
    fn request_rerender(&self) {
        self.rerenders.fetch_add(1, Ordering::SeqCst);

        let old: Vec<TileNodes> = {
            let mut tiles = self.tiles.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *tiles).into_values().collect()
        };
        for nodes in old {
            self.document.remove(nodes.tile);
        }

        let roster = self.roster.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut rendered = BTreeMap::new();
        for id in roster {
            match self.render_tile(&id) {
                Ok(nodes) => {
                    rendered.insert(id, nodes);
                }
                Err(e) => log::warn!("Dock failed to render tile for {}: {}", id, e),
            }
        }
        *self.tiles.lock().unwrap_or_else(|e| e.into_inner()) = rendered;
    }

    fn tile_for(&self, id: &ParticipantId) -> Option<NodeRef> {
        if !self.accessor {
            return None;
        }
        self.tile(id).map(|nodes| nodes.tile)
    }

    fn video_surface_for(&self, id: &ParticipantId) -> Option<NodeRef> {
        if !self.accessor {
            return None;
        }
        self.tile(id).map(|nodes| nodes.video)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DockEmbedConfig;

    #[test]
    fn test_rerender_replaces_tiles() {
        let document = Arc::new(MemoryDocument::new());
        let dock = MemoryDock::new(document.clone(), DockEmbedConfig::default().dock);
        let first = dock.add_tile("alice").unwrap();

        dock.request_rerender();

        let second = dock.tile(&"alice".into()).unwrap();
        assert_ne!(first.tile, second.tile);
        assert!(!document.is_connected(first.tile));
        assert!(document.is_connected(second.video));
        assert_eq!(dock.rerender_count(), 1);
    }

    #[test]
    fn test_roster_change_applies_on_rerender() {
        let document = Arc::new(MemoryDocument::new());
        let dock = MemoryDock::new(document, DockEmbedConfig::default().dock);
        dock.add_tile("alice").unwrap();
        dock.set_roster(["bob"]);

        assert!(dock.tile(&"alice".into()).is_some());
        dock.request_rerender();
        assert!(dock.tile(&"alice".into()).is_none());
        assert!(dock.tile(&"bob".into()).is_some());
    }

    #[test]
    fn test_store_notifies_subscribers() {
        let store = MemoryMappingStore::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        assert!(store.subscribe(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        store.set("alice", "https://x/y");
        store.remove(&"alice".into());
        store.set_silently(StreamMap::new());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
