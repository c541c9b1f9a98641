use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::camera::CameraHandle;
use crate::error::{CaptureError, CaptureResult};
use crate::orientation::TargetFrame;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Source rectangle taken from a video frame, in source pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Largest centered region of a `vw`×`vh` frame with the target's aspect.
    ///
    /// A relatively wider source keeps its full height and loses columns on
    /// both sides; otherwise the full width is kept and rows are trimmed.
    pub fn centered(vw: u32, vh: u32, target: TargetFrame) -> Option<Self> {
        if vw == 0 || vh == 0 || target.width == 0 || target.height == 0 {
            return None;
        }

        let src_aspect = vw as f64 / vh as f64;
        let dst_aspect = target.aspect_ratio();

        let region = if src_aspect > dst_aspect {
            let width = ((vh as f64 * dst_aspect).round() as u32).clamp(1, vw);
            CropRegion {
                x: ((vw - width) as f64 / 2.0).round() as u32,
                y: 0,
                width,
                height: vh,
            }
        } else {
            let height = ((vw as f64 / dst_aspect).round() as u32).clamp(1, vh);
            CropRegion {
                x: 0,
                y: ((vh - height) as f64 / 2.0).round() as u32,
                width: vw,
                height,
            }
        };
        Some(region)
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

/// A captured, cropped and JPEG-compressed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StillImage {
    width: u32,
    height: u32,
    jpeg: Vec<u8>,
}

impl StillImage {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn jpeg_bytes(&self) -> &[u8] {
        &self.jpeg
    }

    pub fn to_data_uri(&self) -> String {
        format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
        )
    }
}

/// Turns live frames into fixed-size stills.
#[derive(Debug, Clone)]
pub struct FrameCropper {
    quality: u8,
}

impl Default for FrameCropper {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameCropper {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Take a still from the camera at exactly the target size.
    pub fn crop(&self, camera: &mut CameraHandle, target: TargetFrame) -> CaptureResult<StillImage> {
        let (vw, vh) = camera.natural_size();
        if vw == 0 || vh == 0 {
            log::debug!("{} has no frame yet", camera.name());
            return Err(CaptureError::DeviceNotReady);
        }
        let frame = camera.grab_frame()?;
        self.crop_frame(&frame, target)
    }

    pub fn crop_frame(&self, frame: &RgbImage, target: TargetFrame) -> CaptureResult<StillImage> {
        let (vw, vh) = frame.dimensions();
        let region = CropRegion::centered(vw, vh, target).ok_or(CaptureError::DeviceNotReady)?;

        let cropped = imageops::crop_imm(frame, region.x, region.y, region.width, region.height).to_image();
        let scaled = imageops::resize(&cropped, target.width, target.height, FilterType::Triangle);

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode(
            scaled.as_raw(),
            scaled.width(),
            scaled.height(),
            image::ColorType::Rgb8,
        )?;

        log::info!(
            "Cropped {}x{} frame at ({}, {}) {}x{} to {}x{} still ({} bytes)",
            vw, vh, region.x, region.y, region.width, region.height,
            target.width, target.height, jpeg.len()
        );

        Ok(StillImage {
            width: target.width,
            height: target.height,
            jpeg,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::TestPatternSource;
    use crate::orientation::{LANDSCAPE_FRAME, PORTRAIT_FRAME};
    use std::time::Duration;

    #[test]
    fn test_wide_source_into_portrait_keeps_height() {
        let region = CropRegion::centered(1920, 1080, PORTRAIT_FRAME).unwrap();
        assert_eq!(region, CropRegion { x: 656, y: 0, width: 608, height: 1080 });
    }

    #[test]
    fn test_tall_source_into_landscape_keeps_width() {
        let region = CropRegion::centered(720, 1280, LANDSCAPE_FRAME).unwrap();
        assert_eq!(region, CropRegion { x: 0, y: 438, width: 720, height: 405 });
    }

    #[test]
    fn test_matching_aspect_is_untouched() {
        let region = CropRegion::centered(1920, 1080, LANDSCAPE_FRAME).unwrap();
        assert_eq!(region, CropRegion { x: 0, y: 0, width: 1920, height: 1080 });
    }

    #[test]
    fn test_region_matches_target_aspect() {
        let sources = [(640, 480), (1920, 1080), (1080, 1920), (800, 600), (333, 777), (4032, 3024), (1, 1)];
        for target in [PORTRAIT_FRAME, LANDSCAPE_FRAME] {
            for &(vw, vh) in &sources {
                let region = CropRegion::centered(vw, vh, target).unwrap();
                assert!(region.x + region.width <= vw);
                assert!(region.y + region.height <= vh);
                // Within one pixel of rounding on the trimmed side
                let tolerance = 1.0 / region.width.min(region.height) as f64 * target.aspect_ratio().max(1.0) * 2.0;
                assert!(
                    (region.aspect_ratio() - target.aspect_ratio()).abs() <= tolerance,
                    "{}x{} -> {:?}",
                    vw, vh, region
                );
            }
        }
    }

    #[test]
    fn test_zero_source_has_no_region() {
        assert!(CropRegion::centered(0, 480, LANDSCAPE_FRAME).is_none());
        assert!(CropRegion::centered(640, 0, LANDSCAPE_FRAME).is_none());
    }

    #[test]
    fn test_output_is_exactly_target_size() {
        let cropper = FrameCropper::default();
        for target in [PORTRAIT_FRAME, LANDSCAPE_FRAME] {
            let mut camera = CameraHandle::acquire(Box::new(TestPatternSource::new(640, 480)));
            let still = cropper.crop(&mut camera, target).unwrap();
            assert_eq!((still.width(), still.height()), (target.width, target.height));

            let decoded = image::load_from_memory(still.jpeg_bytes()).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (target.width, target.height));
        }
    }

    #[test]
    fn test_unready_camera_is_rejected() {
        let cropper = FrameCropper::default();
        let mut camera = CameraHandle::acquire(Box::new(TestPatternSource::with_warmup(
            640,
            480,
            Duration::from_secs(3600),
        )));
        assert!(matches!(
            cropper.crop(&mut camera, LANDSCAPE_FRAME),
            Err(CaptureError::DeviceNotReady)
        ));
    }

    #[test]
    fn test_data_uri_prefix() {
        let cropper = FrameCropper::new(90);
        let frame = RgbImage::from_pixel(32, 32, image::Rgb([200, 100, 50]));
        let still = cropper.crop_frame(&frame, TargetFrame { width: 16, height: 9 }).unwrap();
        let uri = still.to_data_uri();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
    }

    #[test]
    fn test_quality_is_clamped() {
        assert_eq!(FrameCropper::new(0).quality(), 1);
        assert_eq!(FrameCropper::new(200).quality(), 100);
    }
}
