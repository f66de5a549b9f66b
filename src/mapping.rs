//! Read-only view over the externally owned stream mapping and presence
//!
//! The store and the presence source belong to the host. This module only
//! reads them, once per query, and folds "no binding", "blank binding" and
//! "participant inactive" into a single absent answer.

use crate::config::BindingPolicy;
use crate::errors::EmbedError;
use crate::types::{ParticipantId, StreamBinding, StreamMap};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Callback invoked by a store after its mapping changed
pub type ChangeHandler = Box<dyn Fn() + Send + Sync>;

/// Host-owned persistence of the participant -> URL mapping
pub trait MappingStore: Send + Sync {
    fn get(&self, id: &ParticipantId) -> Result<Option<String>, EmbedError>;

    fn get_all(&self) -> Result<StreamMap, EmbedError>;

    /// Register a change handler. Returns `false` when the store cannot notify.
    fn subscribe(&self, _handler: ChangeHandler) -> bool {
        false
    }
}

/// Host-owned presence tracking
pub trait PresenceSource: Send + Sync {
    fn is_active(&self, id: &ParticipantId) -> bool;
}

impl<F> PresenceSource for F
where
    F: Fn(&ParticipantId) -> bool + Send + Sync,
{
    fn is_active(&self, id: &ParticipantId) -> bool {
        self(id)
    }
}

/// Query surface over mapping + presence
#[derive(Clone)]
pub struct StreamMappingView {
    store: Arc<dyn MappingStore>,
    presence: Arc<dyn PresenceSource>,
    policy: BindingPolicy,
}

impl StreamMappingView {
    pub fn new(
        store: Arc<dyn MappingStore>,
        presence: Arc<dyn PresenceSource>,
        policy: BindingPolicy,
    ) -> Self {
        Self {
            store,
            presence,
            policy,
        }
    }

    pub fn policy(&self) -> BindingPolicy {
        self.policy
    }

    fn admits(&self, id: &ParticipantId) -> bool {
        match self.policy {
            BindingPolicy::ActiveAndMapped => self.presence.is_active(id),
            BindingPolicy::MappedOnly => true,
        }
    }

    /// Raw URL of the participant's effective binding, if any
    pub fn effective_url(&self, id: &ParticipantId) -> Option<String> {
        let url = match self.store.get(id) {
            Ok(url) => url?,
            Err(e) => {
                log::debug!("Mapping read for {} failed, treating as absent: {}", id, e);
                return None;
            }
        };

        let url = url.trim();
        if url.is_empty() || !self.admits(id) {
            return None;
        }
        Some(url.to_string())
    }

    /// Every effective binding, read from a single snapshot of the store
    pub fn effective_bindings(&self) -> Vec<StreamBinding> {
        let map = match self.store.get_all() {
            Ok(map) => map,
            Err(e) => {
                log::debug!("Mapping snapshot failed, treating as empty: {}", e);
                return Vec::new();
            }
        };

        map.bindings()
            .filter(|binding| self.admits(&binding.participant_id))
            .collect()
    }

    /// Participants whose binding is currently effective
    pub fn connected_participants(&self) -> BTreeSet<ParticipantId> {
        self.effective_bindings()
            .into_iter()
            .map(|binding| binding.participant_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryMappingStore, MemoryPresence};

    fn view(
        store: &Arc<MemoryMappingStore>,
        presence: &Arc<MemoryPresence>,
        policy: BindingPolicy,
    ) -> StreamMappingView {
        StreamMappingView::new(store.clone(), presence.clone(), policy)
    }

    #[test]
    fn test_effective_url_requires_presence() {
        let store = Arc::new(MemoryMappingStore::with_entries([("alice", "https://x/y")]));
        let presence = Arc::new(MemoryPresence::default());
        let view = view(&store, &presence, BindingPolicy::ActiveAndMapped);

        assert_eq!(view.effective_url(&"alice".into()), None);
        presence.set_active("alice", true);
        assert_eq!(view.effective_url(&"alice".into()), Some("https://x/y".to_string()));
    }

    #[test]
    fn test_missing_and_inactive_are_both_absent() {
        let store = Arc::new(MemoryMappingStore::with_entries([("alice", "https://x/y")]));
        let presence = Arc::new(MemoryPresence::with_active(["bob"]));
        let view = view(&store, &presence, BindingPolicy::ActiveAndMapped);

        assert_eq!(view.effective_url(&"alice".into()), None);
        assert_eq!(view.effective_url(&"bob".into()), None);
        assert!(view.connected_participants().is_empty());
    }

    #[test]
    fn test_mapped_only_ignores_presence() {
        let store = Arc::new(MemoryMappingStore::with_entries([("alice", "https://x/y")]));
        let presence = Arc::new(MemoryPresence::default());
        let view = view(&store, &presence, BindingPolicy::MappedOnly);

        let connected = view.connected_participants();
        assert!(connected.contains(&"alice".into()));
    }

    #[test]
    fn test_unreadable_store_reads_as_empty() {
        let store = Arc::new(MemoryMappingStore::with_entries([("alice", "https://x/y")]));
        let presence = Arc::new(MemoryPresence::with_active(["alice"]));
        let view = view(&store, &presence, BindingPolicy::ActiveAndMapped);

        store.set_unreadable(true);
        assert_eq!(view.effective_url(&"alice".into()), None);
        assert!(view.connected_participants().is_empty());

        store.set_unreadable(false);
        assert_eq!(view.connected_participants().len(), 1);
    }

    #[test]
    fn test_closure_presence_source() {
        let store = Arc::new(MemoryMappingStore::with_entries([
            ("alice", "https://x/a"),
            ("bob", "https://x/b"),
        ]));
        let presence: Arc<dyn PresenceSource> =
            Arc::new(|id: &ParticipantId| id.as_str() == "bob");
        let view = StreamMappingView::new(store, presence, BindingPolicy::ActiveAndMapped);

        let connected: Vec<_> = view.connected_participants().into_iter().collect();
        assert_eq!(connected, vec![ParticipantId::from("bob")]);
    }
}
