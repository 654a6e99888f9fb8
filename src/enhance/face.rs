use crate::enhance::onnx::{self, PixelRange};
use crate::enhance::{FaceOptions, FaceRestoration, FaceRestorer, Upsampler};
use crate::error::{ModelError, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use ort::session::Session;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

/// Edge length of the aligned face crops GFPGAN is trained on
pub const FACE_SIZE: u32 = 512;

/// Square face region in input pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

impl FaceRegion {
    /// Largest square centered in a `width` x `height` frame
    #[must_use]
    pub fn centered(width: u32, height: u32) -> Self {
        let side = width.min(height);
        Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            side,
        }
    }
}

/// GFPGAN face-restoration runner backed by ONNX Runtime
///
/// The graph has no detector, so unaligned input is handled by restoring
/// the centered square of the frame as the face region. `only_center_face`
/// is therefore always in effect; turning it off only logs a warning.
pub struct OnnxFaceRestorer {
    session: Mutex<Session>,
    input_name: String,
    upscale: u32,
    bg_upsampler: Option<Arc<dyn Upsampler>>,
    center_warning: Once,
}

impl OnnxFaceRestorer {
    /// Load the weights at `weights`
    ///
    /// `bg_upsampler` enlarges the non-face background by `upscale`; without
    /// one, Lanczos3 resizing is used.
    pub fn new(
        weights: &Path,
        upscale: u32,
        bg_upsampler: Option<Arc<dyn Upsampler>>,
    ) -> Result<Self> {
        let session = onnx::load_session(weights)?;
        let input_name = onnx::input_name(&session);

        tracing::info!(
            "Face restorer ready: upscale {upscale}, background upsampler: {}",
            if bg_upsampler.is_some() { "yes" } else { "no" }
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            upscale,
            bg_upsampler,
            center_warning: Once::new(),
        })
    }

    fn restore_crop(&self, face: &RgbImage) -> Result<RgbImage> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| ModelError::InferenceFailed("session lock poisoned".to_string()))?;

        let restored = onnx::run_image(&mut session, &self.input_name, face, PixelRange::Signed)?;
        if restored.dimensions() != (FACE_SIZE, FACE_SIZE) {
            return Err(ModelError::InvalidOutput(format!(
                "face restorer produced {}x{}, expected {FACE_SIZE}x{FACE_SIZE}",
                restored.width(),
                restored.height()
            ))
            .into());
        }
        Ok(restored)
    }
}

impl FaceRestorer for OnnxFaceRestorer {
    fn enhance(&self, image: &DynamicImage, options: &FaceOptions) -> Result<FaceRestoration> {
        if ignores_detection_request(options) {
            self.center_warning.call_once(|| {
                tracing::warn!(
                    "No face detector available; only the centered face region is restored"
                );
            });
        }

        restore_faces(
            image,
            options,
            self.upscale,
            self.bg_upsampler.as_deref(),
            |face| self.restore_crop(face),
        )
    }
}

/// True when the caller asked for every detected face, which needs a detector
fn ignores_detection_request(options: &FaceOptions) -> bool {
    !options.only_center_face && !options.has_aligned
}

/// Crop, restore and optionally paste back, with `restore` running the network
/// on a `FACE_SIZE` square crop
pub(crate) fn restore_faces<F>(
    image: &DynamicImage,
    options: &FaceOptions,
    upscale: u32,
    bg_upsampler: Option<&dyn Upsampler>,
    mut restore: F,
) -> Result<FaceRestoration>
where
    F: FnMut(&RgbImage) -> Result<RgbImage>,
{
    let rgb = image.to_rgb8();

    if options.has_aligned {
        let face = imageops::resize(&rgb, FACE_SIZE, FACE_SIZE, FilterType::Lanczos3);
        let restored = restore(&face)?;
        return Ok(FaceRestoration {
            cropped_faces: vec![DynamicImage::ImageRgb8(face)],
            restored_faces: vec![DynamicImage::ImageRgb8(restored)],
            restored_image: None,
        });
    }

    let region = FaceRegion::centered(rgb.width(), rgb.height());
    let face = crop_face(&rgb, region);
    let restored = restore(&face)?;

    let restored_image = if options.paste_back {
        let background = upscale_background(image, upscale, bg_upsampler)?;
        Some(DynamicImage::ImageRgb8(paste_face(
            background, &restored, region, upscale,
        )))
    } else {
        None
    };

    Ok(FaceRestoration {
        cropped_faces: vec![DynamicImage::ImageRgb8(face)],
        restored_faces: vec![DynamicImage::ImageRgb8(restored)],
        restored_image,
    })
}

fn crop_face(image: &RgbImage, region: FaceRegion) -> RgbImage {
    let crop = imageops::crop_imm(image, region.x, region.y, region.side, region.side).to_image();
    imageops::resize(&crop, FACE_SIZE, FACE_SIZE, FilterType::Lanczos3)
}

#[allow(clippy::cast_precision_loss)]
fn upscale_background(
    image: &DynamicImage,
    upscale: u32,
    bg_upsampler: Option<&dyn Upsampler>,
) -> Result<RgbImage> {
    let target = (image.width() * upscale, image.height() * upscale);

    let background = match bg_upsampler {
        Some(upsampler) => upsampler.enhance(image, upscale as f32)?.to_rgb8(),
        None => imageops::resize(&image.to_rgb8(), target.0, target.1, FilterType::Lanczos3),
    };

    // Outscale rounding can leave the upsampler a pixel off
    if background.dimensions() == target {
        Ok(background)
    } else {
        Ok(imageops::resize(&background, target.0, target.1, FilterType::Lanczos3))
    }
}

/// Scale the restored crop back to the region's size on the upscaled canvas
fn paste_face(
    mut background: RgbImage,
    restored: &RgbImage,
    region: FaceRegion,
    upscale: u32,
) -> RgbImage {
    let side = region.side * upscale;
    let face = imageops::resize(restored, side, side, FilterType::Lanczos3);
    imageops::replace(
        &mut background,
        &face,
        i64::from(region.x * upscale),
        i64::from(region.y * upscale),
    );
    background
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    struct NearestUpsampler;

    impl Upsampler for NearestUpsampler {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        fn enhance(&self, image: &DynamicImage, outscale: f32) -> Result<DynamicImage> {
            let w = (image.width() as f32 * outscale) as u32;
            let h = (image.height() as f32 * outscale) as u32;
            Ok(image.resize_exact(w, h, FilterType::Nearest))
        }

        fn scale(&self) -> u32 {
            4
        }
    }

    #[test]
    fn test_centered_region() {
        assert_eq!(
            FaceRegion::centered(300, 200),
            FaceRegion { x: 50, y: 0, side: 200 }
        );
        assert_eq!(
            FaceRegion::centered(100, 160),
            FaceRegion { x: 0, y: 30, side: 100 }
        );
        assert_eq!(
            FaceRegion::centered(64, 64),
            FaceRegion { x: 0, y: 0, side: 64 }
        );
    }

    #[test]
    fn test_crop_face_is_model_sized() {
        let image = RgbImage::from_pixel(300, 200, Rgb([10, 20, 30]));
        let face = crop_face(&image, FaceRegion::centered(300, 200));
        assert_eq!(face.dimensions(), (FACE_SIZE, FACE_SIZE));
    }

    #[test]
    fn test_background_uses_upsampler() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([1, 2, 3])));
        let background = upscale_background(&image, 2, Some(&NearestUpsampler)).unwrap();
        assert_eq!(background.dimensions(), (60, 40));
        assert_eq!(background.get_pixel(59, 39).0, [1, 2, 3]);
    }

    #[test]
    fn test_background_without_upsampler() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(30, 20, Rgb([9, 9, 9])));
        let background = upscale_background(&image, 3, None).unwrap();
        assert_eq!(background.dimensions(), (90, 60));
    }

    #[test]
    fn test_paste_face_covers_region_only() {
        let background = RgbImage::from_pixel(60, 40, Rgb([0, 0, 0]));
        let restored = RgbImage::from_pixel(FACE_SIZE, FACE_SIZE, Rgb([200, 200, 200]));
        let region = FaceRegion::centered(30, 20);

        let out = paste_face(background, &restored, region, 2);

        assert_eq!(out.dimensions(), (60, 40));
        // region x=5..25 -> 10..50 after x2
        assert_eq!(out.get_pixel(30, 20).0, [200, 200, 200]);
        assert_eq!(out.get_pixel(5, 20).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(55, 20).0, [0, 0, 0]);
    }

    fn flat_restore(face: &RgbImage) -> Result<RgbImage> {
        assert_eq!(face.dimensions(), (FACE_SIZE, FACE_SIZE));
        Ok(RgbImage::from_pixel(FACE_SIZE, FACE_SIZE, Rgb([250, 250, 250])))
    }

    fn dark_frame(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([5, 5, 5])))
    }

    #[test]
    fn test_aligned_input_returns_faces_only() {
        let options = FaceOptions {
            has_aligned: true,
            ..FaceOptions::default()
        };
        let mut calls = 0;

        let result = restore_faces(&dark_frame(100, 80), &options, 2, None, |face| {
            calls += 1;
            flat_restore(face)
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert!(result.restored_image.is_none());
        assert_eq!(result.cropped_faces.len(), 1);
        assert_eq!(result.cropped_faces[0].width(), FACE_SIZE);
        assert_eq!(result.restored_faces[0].to_rgb8().get_pixel(0, 0).0, [250, 250, 250]);
    }

    #[test]
    fn test_no_paste_back_skips_frame() {
        let options = FaceOptions {
            paste_back: false,
            ..FaceOptions::default()
        };

        let result =
            restore_faces(&dark_frame(60, 40), &options, 2, Some(&NearestUpsampler), flat_restore)
                .unwrap();

        assert!(result.restored_image.is_none());
        assert_eq!(result.restored_faces.len(), 1);
    }

    #[test]
    fn test_paste_back_composes_upscaled_frame() {
        let result = restore_faces(
            &dark_frame(60, 40),
            &FaceOptions::default(),
            2,
            Some(&NearestUpsampler),
            flat_restore,
        )
        .unwrap();

        let frame = result.restored_image.unwrap().to_rgb8();
        assert_eq!(frame.dimensions(), (120, 80));
        // centered region x=10..50 -> 20..100 after x2
        assert_eq!(frame.get_pixel(60, 40).0, [250, 250, 250]);
        assert_eq!(frame.get_pixel(5, 40).0, [5, 5, 5]);
        assert_eq!(frame.get_pixel(115, 40).0, [5, 5, 5]);
    }

    #[test]
    fn test_restore_error_propagates() {
        let err = restore_faces(&dark_frame(32, 32), &FaceOptions::default(), 2, None, |_| {
            Err(ModelError::InferenceFailed("boom".to_string()).into())
        })
        .unwrap_err();

        assert!(matches!(
            err,
            crate::error::RestoreError::Model(ModelError::InferenceFailed(_))
        ));
    }

    #[test]
    fn test_detection_request_flagged() {
        assert!(ignores_detection_request(&FaceOptions::default()));
        assert!(!ignores_detection_request(&FaceOptions {
            only_center_face: true,
            ..FaceOptions::default()
        }));
        assert!(!ignores_detection_request(&FaceOptions {
            has_aligned: true,
            ..FaceOptions::default()
        }));
    }
}
