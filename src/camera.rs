use anyhow::{Context, Result};
use image::{ImageBuffer, RgbImage};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::error::{CaptureError, CaptureResult};

/// A live video feed the cropper can take a still from.
pub trait VideoSource: Send {
    fn name(&self) -> &str;

    /// Natural frame size; `(0, 0)` until the device delivers frames.
    fn natural_size(&self) -> (u32, u32);

    /// Grab the current frame at natural size.
    fn grab_frame(&mut self) -> CaptureResult<RgbImage>;
}

/// Exclusive handle to the capture device.
///
/// Acquired when the capture surface mounts and released when dropped; only
/// the frame cropper reads through it, and only at the moment of a capture.
pub struct CameraHandle {
    source: Box<dyn VideoSource>,
}

impl CameraHandle {
    pub fn acquire(source: Box<dyn VideoSource>) -> Self {
        log::info!("Camera acquired: {}", source.name());
        Self { source }
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }

    pub fn natural_size(&self) -> (u32, u32) {
        self.source.natural_size()
    }

    pub fn grab_frame(&mut self) -> CaptureResult<RgbImage> {
        self.source.grab_frame()
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        log::info!("Camera released: {}", self.source.name());
    }
}

/// Synthetic gradient feed for development machines without a camera.
///
/// Reports no frames until `warmup` has elapsed since creation, the way a
/// real webcam has no video dimensions right after it is opened.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    ready_at: Instant,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_warmup(width, height, Duration::ZERO)
    }

    pub fn with_warmup(width: u32, height: u32, warmup: Duration) -> Self {
        Self {
            width,
            height,
            ready_at: Instant::now() + warmup,
        }
    }

    fn is_ready(&self) -> bool {
        Instant::now() >= self.ready_at
    }
}

impl VideoSource for TestPatternSource {
    fn name(&self) -> &str {
        "test pattern"
    }

    fn natural_size(&self) -> (u32, u32) {
        if self.is_ready() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn grab_frame(&mut self) -> CaptureResult<RgbImage> {
        if !self.is_ready() || self.width == 0 || self.height == 0 {
            return Err(CaptureError::DeviceNotReady);
        }
        let (w, h) = (self.width, self.height);
        Ok(ImageBuffer::from_fn(w, h, |x, y| {
            let r = (x * 255 / w) as u8;
            let g = (y * 255 / h) as u8;
            let b = ((x + y) * 255 / (w + h)) as u8;
            image::Rgb([r, g, b])
        }))
    }
}

/// Treats an image on disk as a frozen live feed.
pub struct StillFileSource {
    path: PathBuf,
    frame: RgbImage,
}

impl StillFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let frame = image::open(&path)
            .with_context(|| format!("Failed to load camera image from {}", path.display()))?
            .to_rgb8();
        log::debug!("Loaded still feed {}x{} from {}", frame.width(), frame.height(), path.display());
        Ok(Self { path, frame })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VideoSource for StillFileSource {
    fn name(&self) -> &str {
        "still file"
    }

    fn natural_size(&self) -> (u32, u32) {
        self.frame.dimensions()
    }

    fn grab_frame(&mut self) -> CaptureResult<RgbImage> {
        Ok(self.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_reports_size() {
        let mut source = TestPatternSource::new(64, 48);
        assert_eq!(source.natural_size(), (64, 48));
        let frame = source.grab_frame().unwrap();
        assert_eq!(frame.dimensions(), (64, 48));
        assert!(frame.get_pixel(0, 0)[0] < frame.get_pixel(63, 47)[0]);
    }

    #[test]
    fn test_pattern_warming_up_has_no_size() {
        let mut source = TestPatternSource::with_warmup(64, 48, Duration::from_secs(3600));
        assert_eq!(source.natural_size(), (0, 0));
        assert!(matches!(source.grab_frame(), Err(CaptureError::DeviceNotReady)));
    }

    #[test]
    fn test_still_file_source() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("frame.png");
        RgbImage::from_pixel(30, 20, image::Rgb([10, 20, 30])).save(&path).unwrap();

        let mut source = StillFileSource::open(&path).unwrap();
        assert_eq!(source.path(), path.as_path());
        assert_eq!(source.natural_size(), (30, 20));
        assert_eq!(source.grab_frame().unwrap().get_pixel(5, 5), &image::Rgb([10, 20, 30]));
    }

    #[test]
    fn test_still_file_source_missing() {
        assert!(StillFileSource::open("/nonexistent/frame.png").is_err());
    }

    #[test]
    fn test_handle_forwards_to_source() {
        let mut handle = CameraHandle::acquire(Box::new(TestPatternSource::new(8, 4)));
        assert_eq!(handle.name(), "test pattern");
        assert_eq!(handle.natural_size(), (8, 4));
        assert!(handle.grab_frame().is_ok());
    }
}
