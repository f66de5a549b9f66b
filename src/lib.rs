//! CrabDock: external video embeds layered over a host's camera dock
//!
//! The host renders one camera tile per connected participant. This crate
//! replaces what those tiles show with an embedded third-party stream (an
//! iframe) configured per participant, while feeding the host a tiny inert
//! placeholder stream so it believes every mapped participant has video.
//!
//! # Features
//! - Declarative reconciliation of overlays against the live dock
//! - Bounded polling for tiles the dock renders late
//! - Idempotent embed URL normalization
//! - In-memory host collaborators for headless use and testing
//!
//! # Usage
//! ```rust,ignore
//! use crabdock::{hooks, EmbedAvClient, HostEvent};
//!
//! let client = std::sync::Arc::new(EmbedAvClient::new(config, document, dock, store.clone(), presence));
//! hooks::install(store.as_ref(), &client);
//! hooks::dispatch(&client, &HostEvent::Ready);
//! ```
pub mod client;
pub mod config;
pub mod dock;
pub mod dom;
pub mod embed_url;
pub mod errors;
pub mod hooks;
pub mod mapping;
pub mod media;
pub mod reconcile;
pub mod types;

// In-memory host collaborators - used by the simulator and offline tests
pub mod testing;

// Re-exports for convenience
pub use client::EmbedAvClient;
pub use config::{BindingPolicy, DockEmbedConfig};
pub use dock::{Dock, TileLocator};
pub use dom::{Document, MemoryDocument, NodeRef, Selector};
pub use embed_url::EmbedUrlBuilder;
pub use errors::EmbedError;
pub use hooks::HostEvent;
pub use mapping::{MappingStore, PresenceSource, StreamMappingView};
pub use media::{DummyStreamFactory, MediaHandle};
pub use reconcile::{
    EmbedReconciler, PassHandle, PassReport, RetryOutcome, RetryScheduler, RetryState,
    VideoAttachment,
};
pub use types::{ParticipantId, StreamBinding, StreamMap};

/// Initialize logging for the embed core
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabdock=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
