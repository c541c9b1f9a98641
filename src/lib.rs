//! Capture a photo from a live camera feed, crop it to the orientation's
//! fixed frame, submit it to an analysis service and reveal the reply section
//! by section, ignoring replies that no longer belong to the latest request.

pub mod camera;
#[cfg(feature = "libcamera")]
pub mod camera_controller;
pub mod config;
pub mod controller;
pub mod correlator;
pub mod crop;
pub mod error;
pub mod orientation;
pub mod revealer;
pub mod sanitizer;
pub mod session;
pub mod transport;

pub use camera::{CameraHandle, StillFileSource, TestPatternSource, VideoSource};
pub use config::{CameraKind, Config, ConfigBuilder, OrientationSetting};
pub use controller::{dispatch, ResultBody, ServiceReply, SessionController, SessionView, ViewEffect};
pub use correlator::{CorrelationId, Correlator, SubmissionRequest, SubmissionResult};
pub use crop::{CropRegion, FrameCropper, StillImage};
pub use error::{CaptureError, TransportError};
pub use orientation::{
    ManualOrientation, OrientationMode, OrientationMonitor, OrientationQuery, TargetFrame,
    UnavailableOrientation,
};
pub use revealer::{split_segments, RevealState, Revealer};
pub use sanitizer::sanitize;
pub use session::{CaptureSession, CaptureStatus};
pub use transport::{AnalysisService, AnalyzeResponse, HttpAnalysisService};
