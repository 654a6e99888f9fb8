//! Path validation and output naming helpers.

use crate::error::{RestoreError, Result};
use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

/// Image extensions accepted as enhancement input (compared lowercase)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff"];

/// Suffix inserted before the extension of derived output names
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_enhanced";

/// Check that `path` exists and has a supported image extension
pub fn validate_image_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(RestoreError::NotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        let shown = if ext.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{ext}")
        };
        return Err(RestoreError::UnsupportedFormat(shown));
    }

    Ok(())
}

/// Make sure the directory that will hold `output_path` exists
pub fn create_output_dir(output_path: &Path) -> Result<()> {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent)?;
            Ok(())
        }
        _ => Ok(()),
    }
}

/// `a/b/photo.jpg` -> `a/b/photo_enhanced.jpg`
#[must_use]
pub fn derive_output_filename(input: &Path) -> PathBuf {
    derive_output_filename_with(input, DEFAULT_OUTPUT_SUFFIX)
}

/// Insert `suffix` between the file stem and the extension
#[must_use]
pub fn derive_output_filename_with(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let file_name = match input.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };

    input.with_file_name(file_name)
}

/// Downscale for display so the longer side is at most `max_side`
///
/// Images already within bounds are returned unchanged.
#[must_use]
pub fn display_thumbnail(image: &DynamicImage, max_side: u32) -> DynamicImage {
    if image.width() <= max_side && image.height() <= max_side {
        return image.clone();
    }
    image.thumbnail(max_side, max_side)
}
