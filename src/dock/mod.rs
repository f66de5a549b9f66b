//! The host camera dock
//!
//! The dock renders one tile per connected participant on its own schedule.
//! The core can ask it to re-render and may use its optional accessors, but
//! it never creates or destroys tiles itself.

pub mod locator;

pub use locator::{LocateStrategy, TileLocator, TileRef};

use crate::dom::NodeRef;
use crate::types::ParticipantId;

/// Host dock collaborator
pub trait Dock: Send + Sync {
    /// Ask the dock to re-render. Asynchronous and fire-and-forget.
    fn request_rerender(&self);

    /// Host accessor for a participant's tile, when the host exposes one
    fn tile_for(&self, _id: &ParticipantId) -> Option<NodeRef> {
        None
    }

    /// Host accessor for a participant's video surface, when the host exposes one
    fn video_surface_for(&self, _id: &ParticipantId) -> Option<NodeRef> {
        None
    }
}
