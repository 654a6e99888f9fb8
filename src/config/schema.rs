use crate::error::{RestoreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub upscaler: UpscalerConfig,
    #[serde(default)]
    pub face: FaceConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ModelsConfig {
    #[serde(default = "default_models_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub upscaler: WeightOverride,
    #[serde(default)]
    pub face: WeightOverride,
}

/// Replaces the registry's download URL and/or local file name for one weight
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct WeightOverride {
    pub url: Option<String>,
    pub file_name: Option<String>,
}

/// Super-resolution runner hyperparameters
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct UpscalerConfig {
    /// Native scale of the network
    #[serde(default = "default_scale")]
    pub scale: u32,
    /// Final scale applied to `upscale_image` results
    #[serde(default = "default_outscale")]
    pub outscale: f32,
    /// Tile edge in input pixels, 0 disables tiling
    #[serde(default = "default_tile")]
    pub tile: u32,
    #[serde(default = "default_tile_pad")]
    pub tile_pad: u32,
}

/// Face-restoration runner options
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FaceConfig {
    /// Background upscale factor for `enhance_faces`
    #[serde(default = "default_face_upscale")]
    pub upscale: u32,
    #[serde(default)]
    pub has_aligned: bool,
    #[serde(default)]
    pub only_center_face: bool,
    #[serde(default = "default_true")]
    pub paste_back: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DownloadConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default = "default_suffix")]
    pub suffix: String,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,
}

// Default value functions
fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_scale() -> u32 {
    4
}
fn default_outscale() -> f32 {
    4.0
}
fn default_tile() -> u32 {
    0
}
fn default_tile_pad() -> u32 {
    10
}
fn default_face_upscale() -> u32 {
    2
}
fn default_true() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    1800
}
fn default_suffix() -> String {
    "_enhanced".to_string()
}
fn default_thumbnail_size() -> u32 {
    512
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            dir: default_models_dir(),
            upscaler: WeightOverride::default(),
            face: WeightOverride::default(),
        }
    }
}

impl Default for UpscalerConfig {
    fn default() -> Self {
        Self {
            scale: default_scale(),
            outscale: default_outscale(),
            tile: default_tile(),
            tile_pad: default_tile_pad(),
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            upscale: default_face_upscale(),
            has_aligned: false,
            only_center_face: false,
            paste_back: default_true(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            suffix: default_suffix(),
            thumbnail_size: default_thumbnail_size(),
        }
    }
}

impl Config {
    /// Load config from the user config directory, or defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Load config from an explicit path, or defaults if the file doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            RestoreError::Config(format!("Failed to parse {}: {e}", path.display()))
        })?;
        config.validate()?;

        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.upscaler.scale == 0 {
            return Err(RestoreError::Config(
                "upscaler.scale must be at least 1".to_string(),
            ));
        }
        if !(self.upscaler.outscale.is_finite() && self.upscaler.outscale > 0.0) {
            return Err(RestoreError::Config(format!(
                "upscaler.outscale must be positive, got {}",
                self.upscaler.outscale
            )));
        }
        if self.face.upscale == 0 {
            return Err(RestoreError::Config(
                "face.upscale must be at least 1".to_string(),
            ));
        }
        if self.download.timeout_secs == 0 {
            return Err(RestoreError::Config(
                "download.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config)
    } else {
        dirs::config_dir()
            .ok_or_else(|| RestoreError::Config("Cannot determine config directory".to_string()))?
    };

    Ok(config_dir.join("restorer").join("config.toml"))
}
