//! Inert placeholder stream
//!
//! A tiny black frame exposed as a disabled, muted video track. The host only
//! needs the track to exist; nothing ever renders it.

use super::{MediaHandle, MediaTrack, TrackKind};
use crate::config::DummyStreamConfig;
use crate::errors::EmbedError;
use std::sync::{Arc, Mutex};

/// Largest placeholder side the canvas source will draw
pub const MAX_PLACEHOLDER_DIMENSION: u32 = 4096;

/// Synthesis primitive behind the dummy stream
pub trait FrameSource: Send + Sync {
    fn synthesize(&self, config: &DummyStreamConfig) -> Result<MediaHandle, EmbedError>;
}

/// Default source: a solid black RGBA canvas
#[derive(Debug, Default, Clone, Copy)]
pub struct CanvasFrameSource;

impl CanvasFrameSource {
    /// Solid black RGBA frame of the given size
    pub fn black_frame(width: u32, height: u32) -> Result<Vec<u8>, EmbedError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                EmbedError::MediaUnavailable(format!("{}x{} frame does not fit in memory", width, height))
            })?;
        let mut data = vec![0u8; len];
        for pixel in data.chunks_exact_mut(4) {
            pixel[3] = 0xff;
        }
        Ok(data)
    }
}

impl FrameSource for CanvasFrameSource {
    fn synthesize(&self, config: &DummyStreamConfig) -> Result<MediaHandle, EmbedError> {
        let sides = 1..=MAX_PLACEHOLDER_DIMENSION;
        if !sides.contains(&config.width) || !sides.contains(&config.height) {
            return Err(EmbedError::MediaUnavailable(format!(
                "cannot draw a {}x{} canvas",
                config.width, config.height
            )));
        }

        let track = MediaTrack {
            kind: TrackKind::Video,
            label: "crabdock-placeholder".to_string(),
            enabled: false,
            muted: true,
        };
        let frame = Self::black_frame(config.width, config.height)?;
        Ok(MediaHandle::from_frame(config.width, config.height, config.fps, frame, track))
    }
}

lazy_static::lazy_static! {
    static ref SHARED_FACTORY: Arc<DummyStreamFactory> =
        Arc::new(DummyStreamFactory::new(DummyStreamConfig { width: 16, height: 16, fps: 1 }));
}

/// Lazily creates the one placeholder handle and hands out clones of it
pub struct DummyStreamFactory {
    config: DummyStreamConfig,
    source: Box<dyn FrameSource>,
    cached: Mutex<Option<MediaHandle>>,
}

impl DummyStreamFactory {
    pub fn new(config: DummyStreamConfig) -> Self {
        Self::with_source(config, Box::new(CanvasFrameSource))
    }

    pub fn with_source(config: DummyStreamConfig, source: Box<dyn FrameSource>) -> Self {
        Self {
            config,
            source,
            cached: Mutex::new(None),
        }
    }

    /// Process-wide factory with the default 16x16 @ 1fps shape
    pub fn shared() -> Arc<DummyStreamFactory> {
        SHARED_FACTORY.clone()
    }

    /// The placeholder handle; the first call synthesizes it.
    ///
    /// Never fails: when synthesis is unavailable an empty handle is cached
    /// and returned instead.
    pub fn get(&self) -> MediaHandle {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = cached.as_ref() {
            return handle.clone();
        }

        let handle = match self.source.synthesize(&self.config) {
            Ok(handle) => {
                log::debug!(
                    "Synthesized placeholder stream {} ({}x{} @ {}fps)",
                    handle.id(),
                    self.config.width,
                    self.config.height,
                    self.config.fps
                );
                handle
            }
            Err(e) => {
                log::warn!("Placeholder stream unavailable, using an empty handle: {}", e);
                MediaHandle::empty()
            }
        };

        *cached = Some(handle.clone());
        handle
    }

    /// Whether the handle has been created yet
    pub fn is_initialized(&self) -> bool {
        self.cached
            .lock()
            .map(|cached| cached.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource(Arc<AtomicUsize>);

    impl FrameSource for CountingSource {
        fn synthesize(&self, config: &DummyStreamConfig) -> Result<MediaHandle, EmbedError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            CanvasFrameSource.synthesize(config)
        }
    }

    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn synthesize(&self, _config: &DummyStreamConfig) -> Result<MediaHandle, EmbedError> {
            Err(EmbedError::MediaUnavailable("no canvas".to_string()))
        }
    }

    fn small() -> DummyStreamConfig {
        DummyStreamConfig {
            width: 16,
            height: 16,
            fps: 1,
        }
    }

    #[test]
    fn test_first_get_synthesizes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = DummyStreamFactory::with_source(small(), Box::new(CountingSource(calls.clone())));
        assert!(!factory.is_initialized());

        let first = factory.get();
        let second = factory.get();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(factory.is_initialized());
    }

    #[test]
    fn test_track_is_disabled_and_muted() {
        let handle = DummyStreamFactory::new(small()).get();
        let track = handle.video_tracks().next().expect("video track");
        assert!(!track.enabled);
        assert!(track.muted);
        assert_eq!(handle.dimensions(), (16, 16));
        assert_eq!(handle.fps(), 1);
        assert_eq!(handle.frame().len(), 16 * 16 * 4);
    }

    #[test]
    fn test_broken_source_yields_stable_empty_handle() {
        let factory = DummyStreamFactory::with_source(small(), Box::new(BrokenSource));
        let first = factory.get();
        assert!(first.is_empty());
        assert_eq!(first, factory.get());
    }

    #[test]
    fn test_black_frame_is_opaque_black() {
        let frame = CanvasFrameSource::black_frame(2, 2).unwrap();
        assert_eq!(frame, vec![0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255]);
    }

    #[test]
    fn test_oversized_canvas_yields_empty_handle() {
        let factory = DummyStreamFactory::new(DummyStreamConfig {
            width: 70_000,
            height: 70_000,
            fps: 1,
        });
        let handle = factory.get();
        assert!(handle.is_empty());
        assert_eq!(handle.dimensions(), (0, 0));
        assert!(factory.is_initialized());
    }

    #[test]
    fn test_black_frame_rejects_overflowing_size() {
        let err = CanvasFrameSource::black_frame(u32::MAX, u32::MAX).unwrap_err();
        assert!(matches!(err, EmbedError::MediaUnavailable(_)));

        let err = CanvasFrameSource
            .synthesize(&DummyStreamConfig {
                width: MAX_PLACEHOLDER_DIMENSION + 1,
                height: 1,
                fps: 1,
            })
            .unwrap_err();
        assert!(matches!(err, EmbedError::MediaUnavailable(_)));
    }

    #[test]
    fn test_shared_factory_is_process_wide() {
        let a = DummyStreamFactory::shared();
        let b = DummyStreamFactory::shared();
        assert_eq!(a.get(), b.get());
    }
}
