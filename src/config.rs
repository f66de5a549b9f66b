//! Configuration management for crabdock
//!
//! Provides loading, saving, and validation of the knobs the embed core
//! reads: retry budget, embed URL defaults, dummy stream shape, overlay
//! markup, and how host tiles are recognised in the dock.

use crate::errors::EmbedError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockEmbedConfig {
    pub retry: RetryConfig,
    pub embed: EmbedConfig,
    pub dummy_stream: DummyStreamConfig,
    pub overlay: OverlayConfig,
    pub dock: DockConfig,
    pub binding: BindingConfig,
}

/// Late-tile polling budget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts before a participant's retry task gives up
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub interval_ms: u64,
}

impl RetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A query parameter set on embed URLs when the operator left it out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedParam {
    pub name: String,
    pub value: String,
}

impl EmbedParam {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Embed URL normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    /// Query key carrying the viewer identity
    pub viewer_param: String,
    /// Defaults applied in order, each only when absent
    pub params: Vec<EmbedParam>,
}

/// Shape of the inert local stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DummyStreamConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// Markup of the overlay the core owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub container_class: String,
    pub frame_tag: String,
    /// Attribute on the container naming its participant
    pub participant_attribute: String,
    /// Class put on the host video surface while it is covered
    pub hidden_video_class: String,
    pub frame_allow: String,
    pub referrer_policy: String,
}

/// How host tiles are recognised in the dock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockConfig {
    pub tile_class: String,
    /// Attribute on a tile naming its participant
    pub participant_attribute: String,
    pub video_tag: String,
    /// Wait after a dock re-render request; 0 yields a single scheduler tick
    pub settle_delay_ms: u64,
}

/// Which bindings count as effective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingPolicy {
    /// Participant must be active and have a mapping entry
    ActiveAndMapped,
    /// A mapping entry alone is enough
    MappedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingConfig {
    pub policy: BindingPolicy,
}

impl Default for DockEmbedConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: 60,
                interval_ms: 50,
            },
            embed: EmbedConfig {
                viewer_param: "label".to_string(),
                params: vec![
                    EmbedParam::new("cleanoutput", "1"),
                    EmbedParam::new("nocontrols", "1"),
                    EmbedParam::new("autostart", "1"),
                    EmbedParam::new("noaudio", "1"),
                ],
            },
            dummy_stream: DummyStreamConfig {
                width: 16,
                height: 16,
                fps: 1,
            },
            overlay: OverlayConfig {
                container_class: "crabdock-embed-host".to_string(),
                frame_tag: "iframe".to_string(),
                participant_attribute: "data-user-id".to_string(),
                hidden_video_class: "crabdock-hidden-video".to_string(),
                frame_allow: "autoplay; fullscreen; picture-in-picture; camera; microphone"
                    .to_string(),
                referrer_policy: "no-referrer".to_string(),
            },
            dock: DockConfig {
                tile_class: "camera-view".to_string(),
                participant_attribute: "data-user".to_string(),
                video_tag: "video".to_string(),
                settle_delay_ms: 0,
            },
            binding: BindingConfig {
                policy: BindingPolicy::ActiveAndMapped,
            },
        }
    }
}

impl DockEmbedConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EmbedError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| EmbedError::Config(format!("Failed to read config file: {}", e)))?;

        let config: DockEmbedConfig = toml::from_str(&contents)
            .map_err(|e| EmbedError::Config(format!("Failed to parse config file: {}", e)))?;

        config.validate().map_err(EmbedError::Config)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EmbedError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EmbedError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EmbedError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EmbedError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("crabdock.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.retry.max_attempts == 0 || self.retry.max_attempts > 1000 {
            return Err("Retry attempts must be between 1 and 1000".to_string());
        }
        if self.retry.interval_ms == 0 {
            return Err("Retry interval must be positive".to_string());
        }

        if self.embed.params.iter().any(|p| p.name.trim().is_empty()) {
            return Err("Embed parameter names must not be empty".to_string());
        }
        if self.embed.viewer_param.trim().is_empty() {
            return Err("Viewer parameter name must not be empty".to_string());
        }

        let max = crate::media::MAX_PLACEHOLDER_DIMENSION;
        if !(1..=max).contains(&self.dummy_stream.width) || !(1..=max).contains(&self.dummy_stream.height) {
            return Err(format!("Invalid dummy stream size (each side must be 1-{})", max));
        }
        if self.dummy_stream.fps == 0 || self.dummy_stream.fps > 60 {
            return Err("Invalid dummy stream FPS (must be 1-60)".to_string());
        }

        let names = [
            ("overlay.container_class", &self.overlay.container_class),
            ("overlay.frame_tag", &self.overlay.frame_tag),
            ("overlay.participant_attribute", &self.overlay.participant_attribute),
            ("overlay.hidden_video_class", &self.overlay.hidden_video_class),
            ("dock.tile_class", &self.dock.tile_class),
            ("dock.participant_attribute", &self.dock.participant_attribute),
            ("dock.video_tag", &self.dock.video_tag),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(format!("{} must not be empty", field));
            }
        }

        Ok(())
    }
}
