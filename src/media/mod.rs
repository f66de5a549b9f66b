//! Local media handles
//!
//! The core never captures a device. The only media it hands to the host is
//! an inert placeholder stream that satisfies "this participant has an active
//! video track".

pub mod dummy;

pub use dummy::{CanvasFrameSource, DummyStreamFactory, FrameSource, MAX_PLACEHOLDER_DIMENSION};

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Kind of a media track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// A single track inside a media handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub kind: TrackKind,
    pub label: String,
    pub enabled: bool,
    pub muted: bool,
}

#[derive(Debug)]
struct MediaHandleInner {
    id: Uuid,
    width: u32,
    height: u32,
    fps: u32,
    tracks: Vec<MediaTrack>,
    frame: Vec<u8>,
    created_at: DateTime<Utc>,
}

/// Shared, read-only reference to a media source.
///
/// Cloning is cheap and every clone compares equal to the original.
#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<MediaHandleInner>,
}

impl MediaHandle {
    /// Handle carrying a single still frame as a video track
    pub fn from_frame(width: u32, height: u32, fps: u32, frame: Vec<u8>, track: MediaTrack) -> Self {
        Self {
            inner: Arc::new(MediaHandleInner {
                id: Uuid::new_v4(),
                width,
                height,
                fps,
                tracks: vec![track],
                frame,
                created_at: Utc::now(),
            }),
        }
    }

    /// A valid handle with no tracks
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(MediaHandleInner {
                id: Uuid::new_v4(),
                width: 0,
                height: 0,
                fps: 0,
                tracks: Vec::new(),
                frame: Vec::new(),
                created_at: Utc::now(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.inner.width, self.inner.height)
    }

    pub fn fps(&self) -> u32 {
        self.inner.fps
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.inner.tracks
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.inner
            .tracks
            .iter()
            .filter(|t| t.kind == TrackKind::Video)
    }

    /// Raw RGBA bytes of the still frame
    pub fn frame(&self) -> &[u8] {
        &self.inner.frame
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tracks.is_empty()
    }

    pub fn same_source(&self, other: &MediaHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_source(other)
    }
}

impl Eq for MediaHandle {}

impl fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("fps", &self.inner.fps)
            .field("tracks", &self.inner.tracks.len())
            .finish()
    }
}
