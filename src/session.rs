use crate::camera::CameraHandle;
use crate::crop::{FrameCropper, StillImage};
use crate::error::{CaptureError, CaptureResult};
use crate::orientation::TargetFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Empty,
    Captured,
}

/// Holds at most one still image.
#[derive(Debug, Default)]
pub struct CaptureSession {
    still: Option<StillImage>,
}

impl CaptureSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> CaptureStatus {
        match self.still {
            Some(_) => CaptureStatus::Captured,
            None => CaptureStatus::Empty,
        }
    }

    pub fn still(&self) -> Option<&StillImage> {
        self.still.as_ref()
    }

    /// Empty -> Captured. On any failure the session stays empty.
    pub fn capture(
        &mut self,
        cropper: &FrameCropper,
        camera: &mut CameraHandle,
        target: TargetFrame,
    ) -> CaptureResult<&StillImage> {
        if self.still.is_some() {
            return Err(CaptureError::AlreadyCaptured);
        }
        let still = cropper.crop(camera, target)?;
        Ok(&*self.still.insert(still))
    }

    /// Captured -> Empty. Returns the discarded still, if any.
    pub fn retake(&mut self) -> Option<StillImage> {
        self.still.take()
    }
}
