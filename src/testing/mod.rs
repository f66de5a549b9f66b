//! In-memory host collaborators
//!
//! Stand-ins for the host's settings store, presence tracking and camera
//! dock. They let the embed core run headless, in the simulator binary and
//! in offline tests.

pub mod host;

pub use host::{MemoryDock, MemoryMappingStore, MemoryPresence, TileNodes};
