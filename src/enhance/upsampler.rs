use crate::config::schema::UpscalerConfig;
use crate::enhance::onnx::{self, PixelRange};
use crate::enhance::Upsampler;
use crate::error::{ModelError, RestoreError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ort::session::Session;
use std::path::Path;
use std::sync::Mutex;

/// Real-ESRGAN super-resolution runner backed by ONNX Runtime
pub struct OnnxUpsampler {
    session: Mutex<Session>,
    input_name: String,
    scale: u32,
    tile: u32,
    tile_pad: u32,
}

impl std::fmt::Debug for OnnxUpsampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxUpsampler")
            .field("input_name", &self.input_name)
            .field("scale", &self.scale)
            .field("tile", &self.tile)
            .field("tile_pad", &self.tile_pad)
            .finish_non_exhaustive()
    }
}

impl OnnxUpsampler {
    /// Load the weights at `weights` with the given hyperparameters
    pub fn new(weights: &Path, config: &UpscalerConfig) -> Result<Self> {
        let session = onnx::load_session(weights)?;
        let input_name = onnx::input_name(&session);

        tracing::info!(
            "Upsampler ready: x{} (tile {}, pad {})",
            config.scale,
            config.tile,
            config.tile_pad
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            scale: config.scale,
            tile: config.tile,
            tile_pad: config.tile_pad,
        })
    }

    fn infer(&self, image: &RgbImage) -> Result<RgbImage> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceFailed("session lock poisoned".to_string()))?;

        let out = onnx::run_image(&mut session, &self.input_name, image, PixelRange::Unit)?;
        check_scaled(image, &out, self.scale)?;
        Ok(out)
    }
}

impl Upsampler for OnnxUpsampler {
    fn enhance(&self, image: &DynamicImage, outscale: f32) -> Result<DynamicImage> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();

        let upscaled = if self.tile > 0 && (width > self.tile || height > self.tile) {
            tracing::debug!("Tiling {width}x{height} input into {}px blocks", self.tile);
            upscale_tiled(&rgb, self.tile, self.tile_pad, self.scale, |t| self.infer(t))?
        } else {
            self.infer(&rgb)?
        };

        Ok(resize_to_outscale(
            DynamicImage::ImageRgb8(upscaled),
            width,
            height,
            outscale,
        ))
    }

    fn scale(&self) -> u32 {
        self.scale
    }
}

fn check_scaled(input: &RgbImage, output: &RgbImage, scale: u32) -> Result<()> {
    let expected = (input.width() * scale, input.height() * scale);
    if output.dimensions() != expected {
        return Err(ModelError::InvalidOutput(format!(
            "upsampler produced {}x{}, expected {}x{} for scale {scale}",
            output.width(),
            output.height(),
            expected.0,
            expected.1
        ))
        .into());
    }
    Ok(())
}

/// Run `infer` over `tile`-sized blocks with `tile_pad` context on each side
/// and stitch the scaled blocks back together.
pub(crate) fn upscale_tiled<F>(
    image: &RgbImage,
    tile: u32,
    tile_pad: u32,
    scale: u32,
    mut infer: F,
) -> Result<RgbImage>
where
    F: FnMut(&RgbImage) -> Result<RgbImage>,
{
    if tile == 0 {
        return Err(RestoreError::Config("tile size must be positive".to_string()));
    }

    let (width, height) = image.dimensions();
    let mut canvas = RgbImage::new(width * scale, height * scale);

    let mut y0 = 0;
    while y0 < height {
        let y1 = (y0 + tile).min(height);
        let y0p = y0.saturating_sub(tile_pad);
        let y1p = (y1 + tile_pad).min(height);

        let mut x0 = 0;
        while x0 < width {
            let x1 = (x0 + tile).min(width);
            let x0p = x0.saturating_sub(tile_pad);
            let x1p = (x1 + tile_pad).min(width);

            let padded = imageops::crop_imm(image, x0p, y0p, x1p - x0p, y1p - y0p).to_image();
            let scaled = infer(&padded)?;

            // Drop the padding context from the scaled block
            let block = imageops::crop_imm(
                &scaled,
                (x0 - x0p) * scale,
                (y0 - y0p) * scale,
                (x1 - x0) * scale,
                (y1 - y0) * scale,
            )
            .to_image();
            imageops::replace(
                &mut canvas,
                &block,
                i64::from(x0 * scale),
                i64::from(y0 * scale),
            );

            x0 += tile;
        }
        y0 += tile;
    }

    Ok(canvas)
}

/// Resize a network-scale result to `outscale` times the input size
///
/// Lanczos3 is only applied when the target differs from what the network
/// produced.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub(crate) fn resize_to_outscale(
    upscaled: DynamicImage,
    in_width: u32,
    in_height: u32,
    outscale: f32,
) -> DynamicImage {
    let target_w = ((in_width as f32 * outscale).round() as u32).max(1);
    let target_h = ((in_height as f32 * outscale).round() as u32).max(1);

    if upscaled.width() == target_w && upscaled.height() == target_h {
        return upscaled;
    }

    upscaled.resize_exact(target_w, target_h, FilterType::Lanczos3)
}
