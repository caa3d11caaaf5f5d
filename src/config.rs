//! Pipeline configuration
//!
//! Stored as TOML. A missing or unreadable file is never fatal: the
//! pipeline falls back to defaults and says so in the log.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};

/// Device capture settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device index
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

/// Live stream output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Encoder bitrate, e.g. "4000k"
    pub bitrate: String,
    /// Stream queue capacity in frames
    pub queue_capacity: usize,
    /// Encoder executable
    pub encoder_program: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            width: DEFAULT_OUTPUT_WIDTH,
            height: DEFAULT_OUTPUT_HEIGHT,
            fps: DEFAULT_FPS,
            bitrate: DEFAULT_BITRATE.to_string(),
            queue_capacity: STREAM_QUEUE_CAPACITY,
            encoder_program: "ffmpeg".to_string(),
        }
    }
}

/// Stitching and post-processing settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    pub brightness_equalization: bool,
    pub color_balance: bool,
    /// Seam window width as a percentage of the output width
    pub overlap_width_percent: u32,
    /// Exact seam window in pixels; takes precedence over the percentage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_pixels: Option<u32>,
    /// Filter application order, by name
    pub filter_order: Vec<String>,
    /// Gray level written to unmapped pixels
    pub background: u8,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            brightness_equalization: true,
            color_balance: true,
            overlap_width_percent: DEFAULT_OVERLAP_PERCENT,
            overlap_pixels: None,
            filter_order: vec![
                "brightness_equalization".to_string(),
                "color_balance".to_string(),
            ],
            background: 0,
        }
    }
}

impl ProcessingConfig {
    /// Overlap window in pixels for a given output width
    pub fn overlap_width(&self, output_width: u32) -> u32 {
        match self.overlap_pixels {
            Some(pixels) => pixels,
            None => (output_width as u64 * self.overlap_width_percent as u64 / 100) as u32,
        }
    }

    /// Whether the named filter is switched on
    pub fn is_enabled(&self, filter: &str) -> bool {
        match filter {
            "brightness_equalization" => self.brightness_equalization,
            "color_balance" => self.color_balance,
            _ => true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub processing: ProcessingConfig,
}

impl PipelineConfig {
    /// Parse from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize to TOML text
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Load from a file, falling back to defaults on any failure
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("No configuration at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                tracing::info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("Failed to load {}: {}, using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Write to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    /// Check values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.output.width == 0 || self.output.height == 0 {
            return Err(Error::Config("output resolution must be non-zero".into()));
        }
        if self.output.fps == 0 {
            return Err(Error::Config("output fps must be non-zero".into()));
        }
        if self.output.queue_capacity == 0 {
            return Err(Error::Config("queue capacity must be non-zero".into()));
        }
        if self.processing.overlap_width_percent > 50 {
            return Err(Error::Config(format!(
                "overlap_width_percent {} exceeds 50",
                self.processing.overlap_width_percent
            )));
        }
        if let Some(pixels) = self.processing.overlap_pixels {
            if pixels > self.output.width / 2 {
                return Err(Error::Config(format!(
                    "overlap_pixels {} exceeds half the output width",
                    pixels
                )));
            }
        }
        Ok(())
    }
}

/// Default configuration path: `config.toml` in the working directory if it
/// exists, otherwise the platform config directory.
pub fn default_config_path() -> PathBuf {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    ProjectDirs::from("", "", "panorama-streamer")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
        .unwrap_or(local)
}
