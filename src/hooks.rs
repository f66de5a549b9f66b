//! Host lifecycle events
//!
//! Every event the host raises funnels into one reconciliation pass.

use crate::client::EmbedAvClient;
use crate::mapping::MappingStore;
use crate::reconcile::PassHandle;
use crate::types::ParticipantId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "participant", rename_all = "snake_case")]
pub enum HostEvent {
    Init,
    Ready,
    /// The dock finished rendering its tiles
    DockRendered,
    ParticipantConnected(ParticipantId),
    PresenceChanged(ParticipantId),
    SettingsChanged,
}

/// Route a host event to the client. `Init` runs no pass.
pub fn dispatch(client: &EmbedAvClient, event: &HostEvent) -> Option<PassHandle> {
    log::debug!("Host event: {:?}", event);
    match event {
        HostEvent::Init => {
            client.initialize();
            None
        }
        HostEvent::Ready => {
            client.connect();
            Some(client.refresh_all(true))
        }
        HostEvent::DockRendered => Some(client.refresh_all(false)),
        HostEvent::ParticipantConnected(_)
        | HostEvent::PresenceChanged(_)
        | HostEvent::SettingsChanged => Some(client.on_settings_changed()),
    }
}

/// Reconcile whenever the store reports a mapping change.
///
/// The handler holds the client weakly. Returns `false` for stores that
/// cannot notify.
pub fn install(store: &dyn MappingStore, client: &Arc<EmbedAvClient>) -> bool {
    let client = Arc::downgrade(client);
    let registered = store.subscribe(Box::new(move || {
        if let Some(client) = client.upgrade() {
            let _ = client.on_settings_changed();
        }
    }));
    if !registered {
        log::debug!("Mapping store does not notify; relying on host events");
    }
    registered
}
