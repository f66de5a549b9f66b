//! Overlay reconciliation
//!
//! [`EmbedReconciler`] decides which overlays should exist, [`OverlayPainter`]
//! writes them into the dock and [`RetryScheduler`] waits for tiles the dock
//! has not rendered yet.

pub mod overlay;
pub mod reconciler;
pub mod retry;

pub use overlay::{AttachChange, OverlayPainter, SourcePolicy};
pub use reconciler::{EmbedReconciler, PassHandle, PassReport, VideoAttachment};
pub use retry::{AttachAttempt, CancelToken, RetryOutcome, RetryScheduler, RetryState, RetryTarget};
