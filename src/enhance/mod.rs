//! Enhancement facade over the super-resolution and face-restoration runners.
//!
//! The runners are opaque behind [`Upsampler`] and [`FaceRestorer`];
//! [`ImageEnhancer::from_config`] wires up the ONNX Runtime implementations,
//! [`ImageEnhancer::new`] accepts any others.

pub mod face;
pub mod onnx;
pub mod upsampler;

use crate::config::schema::{Config, FaceConfig};
use crate::error::{ModelError, Result};
use crate::models::ModelInfo;
use crate::utils::create_output_dir;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;

pub use face::OnnxFaceRestorer;
pub use upsampler::OnnxUpsampler;

/// Super-resolution runner
pub trait Upsampler: Send + Sync {
    /// Upscale `image`, returning a result `outscale` times its size
    fn enhance(&self, image: &DynamicImage, outscale: f32) -> Result<DynamicImage>;

    /// Native scale factor of the network
    fn scale(&self) -> u32;
}

/// Face-restoration runner
pub trait FaceRestorer: Send + Sync {
    fn enhance(&self, image: &DynamicImage, options: &FaceOptions) -> Result<FaceRestoration>;
}

/// Per-call face restoration switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceOptions {
    /// Input is already an aligned face crop
    pub has_aligned: bool,
    pub only_center_face: bool,
    /// Compose restored faces onto the upscaled background
    pub paste_back: bool,
}

impl Default for FaceOptions {
    fn default() -> Self {
        Self {
            has_aligned: false,
            only_center_face: false,
            paste_back: true,
        }
    }
}

impl From<&FaceConfig> for FaceOptions {
    fn from(config: &FaceConfig) -> Self {
        Self {
            has_aligned: config.has_aligned,
            only_center_face: config.only_center_face,
            paste_back: config.paste_back,
        }
    }
}

/// Everything a face restorer hands back
#[derive(Debug, Clone, Default)]
pub struct FaceRestoration {
    pub cropped_faces: Vec<DynamicImage>,
    pub restored_faces: Vec<DynamicImage>,
    /// Full frame with faces pasted back, when requested
    pub restored_image: Option<DynamicImage>,
}

/// Loads both runners and exposes file-to-file enhancement
pub struct ImageEnhancer {
    upsampler: Arc<dyn Upsampler>,
    face_restorer: Box<dyn FaceRestorer>,
    outscale: f32,
    face_options: FaceOptions,
}

impl ImageEnhancer {
    /// Build from already constructed runners
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new(upsampler: Arc<dyn Upsampler>, face_restorer: Box<dyn FaceRestorer>) -> Self {
        let outscale = upsampler.scale() as f32;
        Self {
            upsampler,
            face_restorer,
            outscale,
            face_options: FaceOptions::default(),
        }
    }

    /// Load the ONNX runners from the configured weight files
    ///
    /// Fails if either weight file is missing or not a loadable graph.
    pub fn from_config(config: &Config) -> Result<Self> {
        let upscaler_weights = ModelInfo::upscaler().resolve(&config.models);
        let face_weights = ModelInfo::face().resolve(&config.models);

        tracing::info!("Loading upsampler from {}", upscaler_weights.path.display());
        let upsampler: Arc<dyn Upsampler> =
            Arc::new(OnnxUpsampler::new(&upscaler_weights.path, &config.upscaler)?);

        tracing::info!("Loading face restorer from {}", face_weights.path.display());
        let face_restorer = OnnxFaceRestorer::new(
            &face_weights.path,
            config.face.upscale,
            Some(Arc::clone(&upsampler)),
        )?;

        Ok(Self::new(upsampler, Box::new(face_restorer))
            .with_outscale(config.upscaler.outscale)
            .with_face_options(FaceOptions::from(&config.face)))
    }

    #[must_use]
    pub fn with_outscale(mut self, outscale: f32) -> Self {
        self.outscale = outscale;
        self
    }

    #[must_use]
    pub fn with_face_options(mut self, face_options: FaceOptions) -> Self {
        self.face_options = face_options;
        self
    }

    /// Upscale the image at `input` and write it to `output`
    pub fn upscale_image(&self, input: &Path, output: &Path) -> Result<DynamicImage> {
        let image = image::open(input)?;
        tracing::debug!(
            "Upscaling {} ({}x{}) by {}",
            input.display(),
            image.width(),
            image.height(),
            self.outscale
        );

        let result = self.upsampler.enhance(&image, self.outscale)?;
        write_image(&result, output)?;
        Ok(result)
    }

    /// Restore faces in the image at `input` and write it to `output`
    ///
    /// Writes the full restored frame, or the first restored face when the
    /// runner returns no frame (aligned input, no paste-back).
    pub fn enhance_faces(&self, input: &Path, output: &Path) -> Result<DynamicImage> {
        let image = image::open(input)?;

        let restoration = self.face_restorer.enhance(&image, &self.face_options)?;
        tracing::debug!(
            "Restored {} face(s) in {}",
            restoration.restored_faces.len(),
            input.display()
        );

        let result = restoration
            .restored_image
            .or_else(|| restoration.restored_faces.into_iter().next())
            .ok_or_else(|| {
                ModelError::InvalidOutput("face restorer returned no image".to_string())
            })?;

        write_image(&result, output)?;
        Ok(result)
    }
}

fn write_image(image: &DynamicImage, output: &Path) -> Result<()> {
    create_output_dir(output)?;
    image.save(output)?;
    tracing::info!("Wrote {}", output.display());
    Ok(())
}
