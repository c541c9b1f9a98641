use thiserror::Error;

/// Locally recoverable failures of the capture/submit flow.
///
/// None of these are fatal: the session is left either empty or holding
/// exactly one still image.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera not ready yet, try again in a moment")]
    DeviceNotReady,

    #[error("no photo yet — capture one first")]
    MissingCapture,

    #[error("photo already captured — retake first")]
    AlreadyCaptured,

    #[error("still reading your photo, hang on")]
    SubmitInFlight,

    #[error("camera failed to deliver a frame: {0}")]
    Device(String),

    #[error("failed to encode still image: {0}")]
    Encode(#[from] image::ImageError),
}

impl CaptureError {
    /// Text shown inline to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::Device(_) | CaptureError::Encode(_) => {
                CaptureError::DeviceNotReady.to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Failures talking to the analysis service.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("analysis service returned status {0}")]
    Status(u16),

    #[error("malformed analysis response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("analysis service unavailable: {0}")]
    Unavailable(String),
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
