use std::path::PathBuf;
use thiserror::Error;

/// Main error type for restorer
#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Image not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Unsupported image format: {0}\n\nSupported extensions: .jpg, .jpeg, .png, .bmp, .tiff")]
    UnsupportedFormat(String),

    #[error("Download error: {0}")]
    Download(#[from] DownloadError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}\n\nTroubleshooting:\n- Check config file: ~/.config/restorer/config.toml\n- Remove unknown keys or fix value types\n- Run with RUST_LOG=debug for more details")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Weight download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Failed to download {url}. Status code: {status}\n\nTroubleshooting:\n- The release URL may have moved; override it under [models] in config\n- Check that the host is reachable from this machine")]
    HttpStatus { url: String, status: u16 },

    #[error("Network error: {0}\n\nTroubleshooting:\n- Check internet connection\n- Verify proxy and firewall settings\n- Try increasing download.timeout_secs in config")]
    Network(String),

    #[error("Not enough disk space: {required_mb} MB required, {available_mb} MB available")]
    DiskSpace { required_mb: u64, available_mb: u64 },
}

/// Inference runner errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Weight file not found: {}\n\nTroubleshooting:\n- Download the weights first: restorer models download\n- Check models.dir in config", .0.display())]
    WeightsMissing(PathBuf),

    #[error("Failed to load model from {}: {reason}\n\nTroubleshooting:\n- The runner expects an ONNX graph; re-export the checkpoint or point the weight url at an ONNX export\n- Delete the file and download it again if it may be truncated", .path.display())]
    LoadFailed { path: PathBuf, reason: String },

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
