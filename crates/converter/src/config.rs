use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::command::WatermarkSpec;
use crate::error::ConfigError;

/// Default byte size above which the slow preset and CRF 28 are used (10 MiB)
pub const DEFAULT_CRF_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Configuration for a batch conversion run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Glob pattern selecting the source files
    pub input_pattern: String,
    /// Directory receiving converted files and the backup subdirectory
    pub output_dir: PathBuf,
    /// Watermark image; `None` or an empty path disables the overlay
    pub watermark_path: Option<PathBuf>,
    /// Watermark width in pixels
    pub watermark_width: u32,
    /// Watermark height in pixels, -1 keeps the aspect ratio
    pub watermark_height: i32,
    /// Horizontal overlay position expression (e.g. `10` or `W-w-10`)
    pub watermark_x: String,
    /// Vertical overlay position expression (e.g. `10` or `H-h-10`)
    pub watermark_y: String,
    /// Maximum number of conversions running at once
    pub max_concurrency: usize,
    /// Inputs larger than this many bytes get `-preset veryslow -crf 28`
    pub crf_threshold: u64,
    /// Encoder binary
    pub ffmpeg_bin: PathBuf,
    /// Per-file encoder timeout in seconds; unset waits forever
    pub encode_timeout_secs: Option<u64>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl BatchConfig {
    /// Create a default configuration matching the command-line defaults
    pub fn default_config() -> Self {
        Self {
            input_pattern: "./*".to_string(),
            output_dir: PathBuf::from("./output"),
            watermark_path: None,
            watermark_width: 100,
            watermark_height: -1,
            watermark_x: "W-w-10".to_string(),
            watermark_y: "10".to_string(),
            max_concurrency: 4,
            crf_threshold: DEFAULT_CRF_THRESHOLD,
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            encode_timeout_secs: None,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }

    /// Reject settings that would hang or produce a broken filter graph
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency(self.max_concurrency));
        }
        if self.watermark().is_some() {
            if self.watermark_width == 0 {
                return Err(ConfigError::InvalidWatermark("width must be positive".to_string()));
            }
            if self.watermark_height == 0 || self.watermark_height < -1 {
                return Err(ConfigError::InvalidWatermark(format!(
                    "height must be -1 or positive, got {}",
                    self.watermark_height
                )));
            }
        }
        Ok(())
    }

    /// Directory where originals are copied before encoding
    pub fn backup_dir(&self) -> PathBuf {
        self.output_dir.join("backup")
    }

    /// Watermark settings, if an overlay image is configured
    pub fn watermark(&self) -> Option<WatermarkSpec> {
        let path = self.watermark_path.as_ref()?;
        if path.as_os_str().is_empty() {
            return None;
        }
        Some(WatermarkSpec {
            path: path.clone(),
            width: self.watermark_width,
            height: self.watermark_height,
            x: self.watermark_x.clone(),
            y: self.watermark_y.clone(),
        })
    }
}
