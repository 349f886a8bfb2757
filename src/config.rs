//! Viewer settings persisted as JSON.
//!
//! Missing fields fall back to their defaults and unknown fields are
//! ignored. Files stamped with a newer [`CONFIG_VERSION`] are refused.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::annotation::ToolSettings;
use crate::colormap::{ColorLut, Colormap};
use crate::enums::PresetColor;
use crate::overlay::{DEFAULT_OPACITY, DEFAULT_THRESHOLD, OverlayStyle};
use crate::zoom::{DEFAULT_ZOOM, DEFAULT_ZOOM_STEP};

/// Bump on breaking changes to the file layout.
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config version {found} is newer than supported version {}", CONFIG_VERSION)]
    UnsupportedVersion { found: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub color: PresetColor,
    pub opacity: f32,
    pub threshold: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            color: PresetColor::Green,
            opacity: DEFAULT_OPACITY,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl OverlayConfig {
    pub fn style(&self) -> OverlayStyle {
        OverlayStyle::preset(self.color, self.opacity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub version: u32,
    /// Mask drawn over every view.
    pub overlay: OverlayConfig,
    /// Automatically detected tumor region.
    pub tumor_overlay: OverlayConfig,
    pub tools: ToolSettings,
    pub zoom: f32,
    pub zoom_step: f32,
    /// Slices moved per wheel notch.
    pub scrub_step: i64,
    /// Minimum spacing of coalesced pointer/wheel events.
    pub frame_budget_ms: u64,
    pub colormap: Colormap,
    pub gamma: f32,
    pub log_level: LogLevel,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            overlay: OverlayConfig::default(),
            tumor_overlay: OverlayConfig {
                color: PresetColor::Red,
                ..OverlayConfig::default()
            },
            tools: ToolSettings::default(),
            zoom: DEFAULT_ZOOM,
            zoom_step: DEFAULT_ZOOM_STEP,
            scrub_step: 3,
            frame_budget_ms: 16,
            colormap: Colormap::Gray,
            gamma: 1.0,
            log_level: LogLevel::default(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion {
                found: config.version,
            });
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&json)?;
        log::debug!("loaded viewer config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }

    pub fn color_lut(&self) -> ColorLut {
        ColorLut::new(self.colormap, self.gamma)
    }

    pub fn frame_budget(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_budget_ms)
    }
}
