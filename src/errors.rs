use thiserror::Error;

/// Errors raised at the seams of the embed core.
///
/// None of these reach the host: the reconciler absorbs them where they occur
/// and degrades to "no overlay" instead.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Mapping store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("DOM operation failed: {0}")]
    Dom(String),
    #[error("Playback rejected: {0}")]
    Playback(String),
    #[error("Media synthesis unavailable: {0}")]
    MediaUnavailable(String),
}

impl EmbedError {
    /// Short category name, used as a log tag
    pub fn kind(&self) -> &'static str {
        match self {
            EmbedError::Config(_) => "config",
            EmbedError::StoreUnavailable(_) => "store",
            EmbedError::Dom(_) => "dom",
            EmbedError::Playback(_) => "playback",
            EmbedError::MediaUnavailable(_) => "media",
        }
    }
}
