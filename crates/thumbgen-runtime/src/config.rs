use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use thumbgen_core::locator::DEFAULT_SEEK_OFFSET_SECS;
use thumbgen_media::capture::CaptureOptions;
use thumbgen_media::jpeg::DEFAULT_JPEG_QUALITY;

use crate::error::{Result, RuntimeError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory or URL prefix the `<id>.mp4` files are served from.
    pub origin: String,
    /// Where finished thumbnails are written.
    pub thumbnail_dir: PathBuf,
    pub seek_offset_secs: f64,
    pub jpeg_quality: u8,
    /// Give up on a capture whose media never loads or seeks. Unset waits
    /// forever.
    pub signal_timeout_ms: Option<u64>,
    pub max_concurrent_captures: Option<usize>,
    /// Default log filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            origin: ".".into(),
            thumbnail_dir: PathBuf::from("thumbnails"),
            seek_offset_secs: DEFAULT_SEEK_OFFSET_SECS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            signal_timeout_ms: None,
            max_concurrent_captures: None,
            log_level: "info".into(),
        }
    }
}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.origin.is_empty() {
            return Err(RuntimeError::InvalidConfig("origin must not be empty".into()));
        }
        if !(self.seek_offset_secs.is_finite() && self.seek_offset_secs > 0.0) {
            return Err(RuntimeError::InvalidConfig(format!(
                "seek_offset_secs must be positive, got {}",
                self.seek_offset_secs
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(RuntimeError::InvalidConfig(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.max_concurrent_captures == Some(0) {
            return Err(RuntimeError::InvalidConfig(
                "max_concurrent_captures must be at least 1".into(),
            ));
        }
        if self.signal_timeout_ms == Some(0) {
            return Err(RuntimeError::InvalidConfig(
                "signal_timeout_ms must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            seek_offset_secs: self.seek_offset_secs,
            jpeg_quality: self.jpeg_quality,
            signal_timeout: self.signal_timeout_ms.map(Duration::from_millis),
        }
    }
}
