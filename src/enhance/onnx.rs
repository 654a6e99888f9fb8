//! ONNX Runtime session loading and image <-> tensor marshalling shared by
//! both runners.

use crate::error::{ModelError, Result};
use image::{Rgb, RgbImage};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use std::path::Path;

/// Value range a graph expects for its pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelRange {
    /// `[0, 1]`
    Unit,
    /// `[-1, 1]`
    Signed,
}

impl PixelRange {
    fn normalize(self, v: u8) -> f32 {
        let unit = f32::from(v) / 255.0;
        match self {
            Self::Unit => unit,
            Self::Signed => unit * 2.0 - 1.0,
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn denormalize(self, v: f32) -> u8 {
        let unit = match self {
            Self::Unit => v,
            Self::Signed => (v + 1.0) / 2.0,
        };
        // clamp keeps the cast in 0..=255
        (unit * 255.0).clamp(0.0, 255.0).round() as u8
    }
}

/// Open an ONNX session for a weight file
pub fn load_session(path: &Path) -> Result<Session> {
    if !path.is_file() {
        return Err(ModelError::WeightsMissing(path.to_path_buf()).into());
    }

    let load_failed = |e: ort::Error| ModelError::LoadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let session = Session::builder()
        .map_err(load_failed)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_failed)?
        .commit_from_file(path)
        .map_err(load_failed)?;

    tracing::debug!("Loaded ONNX session from {}", path.display());
    Ok(session)
}

/// Name of the first graph input
pub fn input_name(session: &Session) -> String {
    session
        .inputs
        .first()
        .map_or_else(|| "input".to_string(), |i| i.name.clone())
}

/// RGB image -> NCHW tensor (batch=1, channels=3, height, width)
pub fn image_to_tensor(image: &RgbImage, range: PixelRange) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        tensor[[0, 0, y as usize, x as usize]] = range.normalize(r);
        tensor[[0, 1, y as usize, x as usize]] = range.normalize(g);
        tensor[[0, 2, y as usize, x as usize]] = range.normalize(b);
    }

    tensor
}

/// Planar RGB `f32` data of a `height` x `width` output -> RGB image
pub fn tensor_to_image(
    height: usize,
    width: usize,
    data: &[f32],
    range: PixelRange,
) -> Result<RgbImage> {
    let channel_size = height * width;
    if data.len() < 3 * channel_size {
        return Err(ModelError::InvalidOutput(format!(
            "expected {} values for a {width}x{height} RGB output, got {}",
            3 * channel_size,
            data.len()
        ))
        .into());
    }

    let width_u32 = u32::try_from(width)
        .map_err(|_| ModelError::InvalidOutput("output width too large".to_string()))?;
    let height_u32 = u32::try_from(height)
        .map_err(|_| ModelError::InvalidOutput("output height too large".to_string()))?;

    Ok(RgbImage::from_fn(width_u32, height_u32, |x, y| {
        let idx = y as usize * width + x as usize;
        Rgb([
            range.denormalize(data[idx]),
            range.denormalize(data[channel_size + idx]),
            range.denormalize(data[2 * channel_size + idx]),
        ])
    }))
}

/// Run a single-input, single-output image graph
pub fn run_image(
    session: &mut Session,
    input_name: &str,
    image: &RgbImage,
    range: PixelRange,
) -> Result<RgbImage> {
    let input = image_to_tensor(image, range);
    let input = input.as_standard_layout().into_owned();

    let input_ref = ort::value::TensorRef::from_array_view(&input)
        .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

    let outputs = session
        .run(ort::inputs![input_name => input_ref])
        .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

    let (_, output) = outputs
        .iter()
        .next()
        .ok_or_else(|| ModelError::InvalidOutput("no output tensor".to_string()))?;

    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| ModelError::InvalidOutput(e.to_string()))?;

    if shape.len() != 4 || shape[1] != 3 {
        return Err(ModelError::InvalidOutput(format!(
            "expected a [1, 3, H, W] tensor, got {} dims",
            shape.len()
        ))
        .into());
    }

    let height = usize::try_from(shape[2])
        .map_err(|_| ModelError::InvalidOutput("negative output height".to_string()))?;
    let width = usize::try_from(shape[3])
        .map_err(|_| ModelError::InvalidOutput("negative output width".to_string()))?;

    tensor_to_image(height, width, data, range)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RestoreError;

    #[test]
    fn test_image_to_tensor_shape_and_unit_range() {
        let image = RgbImage::from_pixel(10, 8, Rgb([255, 128, 0]));
        let tensor = image_to_tensor(&image, PixelRange::Unit);

        assert_eq!(tensor.shape(), &[1, 3, 8, 10]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 1, 0, 0]] - 0.502).abs() < 0.01);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn test_signed_range() {
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 255, 128]));
        let tensor = image_to_tensor(&image, PixelRange::Signed);

        assert!((tensor[[0, 0, 0, 0]] + 1.0).abs() < 0.01);
        assert!((tensor[[0, 1, 0, 0]] - 1.0).abs() < 0.01);
        assert!(tensor[[0, 2, 0, 0]].abs() < 0.01);
    }

    #[test]
    fn test_tensor_to_image_clamps() {
        // 1x2 planar RGB: first pixel overshoots, second undershoots
        let data = [1.5, -0.2, 0.5, 0.0, 0.0, 1.0];
        let image = tensor_to_image(1, 2, &data, PixelRange::Unit).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [255, 128, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_tensor_roundtrip_signed() {
        let image = RgbImage::from_fn(4, 3, |x, y| Rgb([(x * 60) as u8, (y * 80) as u8, 200]));
        let tensor = image_to_tensor(&image, PixelRange::Signed);
        let data: Vec<f32> = tensor.iter().copied().collect();

        let back = tensor_to_image(3, 4, &data, PixelRange::Signed).unwrap();
        assert_eq!(back, image);
    }

    #[test]
    fn test_tensor_to_image_short_buffer() {
        let err = tensor_to_image(2, 2, &[0.0; 5], PixelRange::Unit).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::Model(ModelError::InvalidOutput(_))
        ));
    }

    #[test]
    fn test_load_session_missing_file() {
        let err = load_session(Path::new("/nonexistent/weights.onnx")).unwrap_err();
        assert!(matches!(
            err,
            RestoreError::Model(ModelError::WeightsMissing(_))
        ));
    }
}
