//! Configuration module for the post-processor
//!
//! This module handles:
//! - Static pipeline configuration ([`PostProcConfig`]), persisted as TOML
//! - Per-capture runtime settings supplied by the host ([`settings`])
//!
//! # Config Location
//!
//! The default config file lives in the platform data directory under
//! [`APP_ID`]:
//!
//! - **Linux**: `~/.local/share/dev.hxyulin.snapshot-postproc/postproc.toml`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.snapshot-postproc/postproc.toml`
//! - **Windows**: `%APPDATA%\dev.hxyulin.snapshot-postproc\postproc.toml`
//!
//! Files ending in `.json` are read and written as JSON instead.
//!
//! # Example
//!
//! ```ignore
//! use snapshot_postproc::config::PostProcConfig;
//!
//! let config = PostProcConfig::load_or_default(path);
//! config.save(path)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{PostProcError, Result};
use crate::types::Dimension;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.snapshot-postproc";

/// Default config filename
pub const CONFIG_FILE: &str = "postproc.toml";

/// JPEG quality used when the host supplies none (or a non-positive value)
pub const DEFAULT_JPEG_QUALITY: u32 = 85;

/// Default pattern for saved images; `{}` is replaced by the save counter
pub const DEFAULT_FILE_PATTERN: &str = "img_{}.jpg";

/// Largest picture the encoder is opened for
pub const DEFAULT_MAX_PICTURE_SIZE: Dimension = Dimension::new(4208, 3120);

// ==================== Directories ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default config file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Default directory for images written by the save path
pub fn default_save_dir() -> PathBuf {
    dirs_next::picture_dir()
        .map(|p| p.join("snapshot-postproc"))
        .or_else(|| app_data_dir().map(|p| p.join("captures")))
        .unwrap_or_else(|| PathBuf::from("captures"))
}

// ==================== Encode Config ====================

/// Encoder-related settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeConfig {
    /// Quality used when the capture settings carry none
    pub default_quality: u32,
    /// Keep two destination buffers and let the backend pick the slot
    pub jpeg_burst: bool,
    /// Maximum encode jobs in flight with the backend
    pub max_outstanding_jobs: usize,
    /// Dimensions the backend is opened with
    pub max_picture_size: Dimension,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            default_quality: DEFAULT_JPEG_QUALITY,
            jpeg_burst: false,
            max_outstanding_jobs: 1,
            max_picture_size: DEFAULT_MAX_PICTURE_SIZE,
        }
    }
}

// ==================== Save Config ====================

/// Settings for the longshot save path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    /// Route longshot completions through the save worker
    pub longshot_save: bool,
    /// Directory saved images are written to
    pub directory: PathBuf,
    /// File name pattern; `{}` is replaced by a running counter
    pub file_pattern: String,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            longshot_save: false,
            directory: default_save_dir(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
        }
    }
}

impl SaveConfig {
    /// Path of the `index`-th saved image
    pub fn file_path(&self, index: u32) -> PathBuf {
        let name = if self.file_pattern.contains("{}") {
            self.file_pattern.replacen("{}", &index.to_string(), 1)
        } else {
            format!("{}{}", self.file_pattern, index)
        };
        self.directory.join(name)
    }
}

// ==================== Top-level Config ====================

/// Static configuration of the post-processor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcConfig {
    pub encode: EncodeConfig,
    pub save: SaveConfig,
}

impl PostProcConfig {
    /// Burst encoding is only used when saving is not routed through the save worker
    pub fn burst_enabled(&self) -> bool {
        self.encode.jpeg_burst && !self.save.longshot_save
    }

    /// Number of destination buffers a session keeps
    pub fn output_buffer_count(&self) -> usize {
        if self.burst_enabled() {
            2
        } else {
            1
        }
    }

    /// Load a config file (TOML, or JSON by extension)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PostProcError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        if is_json(path) {
            serde_json::from_str(&content)
                .map_err(|e| PostProcError::Config(format!("Failed to parse config: {}", e)))
        } else {
            toml::from_str(&content)
                .map_err(|e| PostProcError::Config(format!("Failed to parse config: {}", e)))
        }
    }

    /// Load a config file, falling back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the config, creating parent directories as needed
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = if is_json(path) {
            serde_json::to_string_pretty(self)
                .map_err(|e| PostProcError::Config(format!("Failed to serialize config: {}", e)))?
        } else {
            toml::to_string_pretty(self)
                .map_err(|e| PostProcError::Config(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}
