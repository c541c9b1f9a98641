use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::camera::CameraHandle;
use crate::correlator::{CorrelationId, Correlator, SubmissionRequest, SubmissionResult};
use crate::crop::FrameCropper;
use crate::error::{CaptureError, CaptureResult, TransportError};
use crate::orientation::{OrientationMode, OrientationMonitor, TargetFrame};
use crate::revealer::{RevealState, Revealer};
use crate::sanitizer::sanitize;
use crate::session::{CaptureSession, CaptureStatus};
use crate::transport::AnalysisService;

pub const ANALYSIS_FAILED: &str = "analysis failed, try again";
pub const NO_RESULT_PLACEHOLDER: &str = "capture a photo, then submit it to see your reading";

/// One-shot instructions for the render surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEffect {
    ScrollToCapture,
    ScrollToResult,
}

/// A service reply routed back into the event loop.
#[derive(Debug)]
pub struct ServiceReply {
    pub correlation_id: CorrelationId,
    pub outcome: Result<SubmissionResult, TransportError>,
}

/// What the result area should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultBody {
    Loading,
    Html(String),
    Placeholder,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub status: CaptureStatus,
    pub orientation: OrientationMode,
    pub target: TargetFrame,
    pub loading: bool,
    pub revealing: bool,
    pub error: Option<String>,
    pub body: ResultBody,
}

/// Owns every piece of session state and applies events to it one at a time.
pub struct SessionController {
    orientation: OrientationMonitor,
    camera: CameraHandle,
    cropper: FrameCropper,
    session: CaptureSession,
    correlator: Correlator,
    revealer: Revealer,
    loading: bool,
    error: Option<String>,
    effects: Vec<ViewEffect>,
}

impl SessionController {
    pub fn new(
        orientation: OrientationMonitor,
        camera: CameraHandle,
        cropper: FrameCropper,
        revealer: Revealer,
    ) -> Self {
        Self {
            orientation,
            camera,
            cropper,
            session: CaptureSession::new(),
            correlator: Correlator::new(),
            revealer,
            loading: false,
            error: None,
            effects: Vec::new(),
        }
    }

    pub fn status(&self) -> CaptureStatus {
        self.session.status()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn reveal_state(&self) -> RevealState {
        self.revealer.snapshot()
    }

    pub fn subscribe_reveal(&self) -> watch::Receiver<RevealState> {
        self.revealer.subscribe()
    }

    pub fn subscribe_orientation(&self) -> watch::Receiver<OrientationMode> {
        self.orientation.subscribe()
    }

    /// Take a still at the current orientation's target size.
    pub fn capture(&mut self) -> CaptureResult<()> {
        self.error = None;
        let target = self.orientation.target_frame();
        match self.session.capture(&self.cropper, &mut self.camera, target) {
            Ok(still) => {
                log::info!("Captured {}x{} still", still.width(), still.height());
                Ok(())
            }
            Err(e) => {
                log::warn!("Capture failed: {}", e);
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Full reset: still, reveal, loading, error, and any in-flight reply.
    pub fn retake(&mut self) {
        self.session.retake();
        self.correlator.reset();
        self.revealer.cancel();
        self.loading = false;
        self.error = None;
        self.effects.push(ViewEffect::ScrollToCapture);
        log::info!("Retake: session reset");
    }

    /// Tag the current still for sending. Nothing is sent when there is no
    /// still or a request is still loading; the caller dispatches the
    /// returned request.
    pub fn submit(&mut self) -> CaptureResult<SubmissionRequest> {
        if self.loading {
            log::debug!(
                "Submit ignored, rid {:?} still in flight",
                self.correlator.current().map(CorrelationId::as_str)
            );
            return Err(CaptureError::SubmitInFlight);
        }
        match self.correlator.submit(self.session.still()) {
            Ok(request) => {
                self.loading = true;
                self.error = None;
                self.revealer.cancel();
                Ok(request)
            }
            Err(e) => {
                log::warn!("Submit rejected: {}", e);
                self.error = Some(e.user_message());
                Err(e)
            }
        }
    }

    /// Apply a service reply. Returns true if it was accepted as the result.
    pub fn handle_reply(&mut self, reply: ServiceReply) -> bool {
        match reply.outcome {
            Ok(result) => self.on_result(result),
            Err(e) => {
                self.on_transport_error(&reply.correlation_id, &e);
                false
            }
        }
    }

    pub fn on_result(&mut self, result: SubmissionResult) -> bool {
        if self.correlator.accept(&result) {
            self.loading = false;
            if result.payload.trim().is_empty() {
                log::info!("Empty result for rid {}", result.correlation_id);
            } else {
                self.effects.push(ViewEffect::ScrollToResult);
            }
            self.revealer.begin(&result.payload);
            return true;
        }

        // A failed reply to the current request still ends the wait
        if !result.ok && self.correlator.fail(&result.correlation_id) {
            log::warn!("Analysis failed for rid {}", result.correlation_id);
            self.loading = false;
            self.error = Some(ANALYSIS_FAILED.to_string());
        }
        false
    }

    pub fn on_transport_error(&mut self, id: &CorrelationId, error: &TransportError) {
        if self.correlator.fail(id) {
            log::warn!("Request {} failed: {}", id, error);
            self.loading = false;
            self.error = Some(ANALYSIS_FAILED.to_string());
        } else {
            log::debug!("Ignoring failure of stale request {}: {}", id, error);
        }
    }

    /// Submit and wait for the reply inline.
    pub async fn submit_and_wait(&mut self, service: &dyn AnalysisService) -> CaptureResult<bool> {
        let request = self.submit()?;
        let correlation_id = request.correlation_id.clone();
        let outcome = service.analyze(request).await;
        Ok(self.handle_reply(ServiceReply { correlation_id, outcome }))
    }

    pub fn take_effects(&mut self) -> Vec<ViewEffect> {
        std::mem::take(&mut self.effects)
    }

    pub fn view(&self) -> SessionView {
        let reveal = self.revealer.snapshot();
        let body = if self.loading {
            ResultBody::Loading
        } else {
            let html = sanitize(reveal.visible());
            if html.trim().is_empty() {
                ResultBody::Placeholder
            } else {
                ResultBody::Html(html)
            }
        };

        SessionView {
            status: self.session.status(),
            orientation: self.orientation.current_mode(),
            target: self.orientation.target_frame(),
            loading: self.loading,
            revealing: reveal.active,
            error: self.error.clone(),
            body,
        }
    }
}

/// Send `request` on a background task and post the reply to `replies`.
///
/// The request runs to completion even if the session moves on; the
/// correlation check makes a late reply inert.
pub fn dispatch(
    service: Arc<dyn AnalysisService>,
    request: SubmissionRequest,
    replies: mpsc::UnboundedSender<ServiceReply>,
) {
    tokio::spawn(async move {
        let correlation_id = request.correlation_id.clone();
        let outcome = service.analyze(request).await;
        if replies.send(ServiceReply { correlation_id, outcome }).is_err() {
            log::debug!("Session gone, dropping service reply");
        }
    });
}
