use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crop::StillImage;
use crate::error::{CaptureError, CaptureResult};

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 6;

/// Opaque token tying one submission to its eventual response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Fresh id: unix milliseconds plus a short random base36 suffix.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outgoing analysis request.
#[derive(Debug, Clone)]
pub struct SubmissionRequest {
    pub correlation_id: CorrelationId,
    pub image: StillImage,
}

impl SubmissionRequest {
    /// Form fields sent to the service: exactly `image` and `rid`.
    pub fn form_fields(&self) -> [(&'static str, String); 2] {
        [
            ("image", self.image.to_data_uri()),
            ("rid", self.correlation_id.as_str().to_string()),
        ]
    }
}

/// Response from the analysis service, in whatever order it arrives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub correlation_id: CorrelationId,
    pub ok: bool,
    pub payload: String,
}

/// Remembers the latest submission and rejects every response that does not
/// belong to it.
#[derive(Debug, Default)]
pub struct Correlator {
    current: Option<CorrelationId>,
    settled: bool,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag a still image for sending. Fails without side effects when there
    /// is nothing to send.
    pub fn submit(&mut self, still: Option<&StillImage>) -> CaptureResult<SubmissionRequest> {
        let image = still.ok_or(CaptureError::MissingCapture)?.clone();
        let correlation_id = CorrelationId::generate();
        log::info!("Submitting with rid {}", correlation_id);

        if let Some(previous) = self.current.replace(correlation_id.clone()) {
            if !self.settled {
                log::debug!("Superseding unsettled submission {}", previous);
            }
        }
        self.settled = false;

        Ok(SubmissionRequest { correlation_id, image })
    }

    /// True only for an ok response to the current, not yet settled submission.
    pub fn accept(&mut self, result: &SubmissionResult) -> bool {
        if !result.ok || !self.is_pending(&result.correlation_id) {
            log::debug!(
                "Discarding result rid={} ok={} (current: {:?})",
                result.correlation_id,
                result.ok,
                self.current.as_ref().map(CorrelationId::as_str)
            );
            return false;
        }
        self.settled = true;
        true
    }

    /// Settle the current submission as failed. Returns false for any other id.
    pub fn fail(&mut self, id: &CorrelationId) -> bool {
        if !self.is_pending(id) {
            return false;
        }
        self.settled = true;
        true
    }

    /// Whether `id` is the current submission and still awaiting a response.
    pub fn is_pending(&self, id: &CorrelationId) -> bool {
        !self.settled && self.current.as_ref() == Some(id)
    }

    pub fn is_sending(&self) -> bool {
        self.current.is_some() && !self.settled
    }

    pub fn current(&self) -> Option<&CorrelationId> {
        self.current.as_ref()
    }

    /// Forget the current submission; anything still in flight becomes inert.
    pub fn reset(&mut self) {
        if let Some(id) = self.current.take() {
            log::debug!("Correlator reset, rid {} is now inert", id);
        }
        self.settled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::FrameCropper;
    use crate::orientation::TargetFrame;
    use std::collections::HashSet;

    fn still() -> StillImage {
        let frame = image::RgbImage::from_pixel(16, 16, image::Rgb([1, 2, 3]));
        FrameCropper::default()
            .crop_frame(&frame, TargetFrame { width: 8, height: 8 })
            .unwrap()
    }

    fn ok_result(id: &CorrelationId, payload: &str) -> SubmissionResult {
        SubmissionResult {
            correlation_id: id.clone(),
            ok: true,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_id_format() {
        let id = CorrelationId::generate();
        let (millis, suffix) = id.as_str().split_once('-').unwrap();
        assert!(millis.parse::<i64>().unwrap() > 0);
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| SUFFIX_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_ids_are_unique() {
        let ids: HashSet<_> = (0..200).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_submit_without_still_fails() {
        let mut correlator = Correlator::new();
        assert!(matches!(correlator.submit(None), Err(CaptureError::MissingCapture)));
        assert!(correlator.current().is_none());
        assert!(!correlator.is_sending());
    }

    #[test]
    fn test_form_fields() {
        let mut correlator = Correlator::new();
        let request = correlator.submit(Some(&still())).unwrap();
        let fields = request.form_fields();
        assert_eq!(fields[0].0, "image");
        assert!(fields[0].1.starts_with("data:image/jpeg;base64,"));
        assert_eq!(fields[1], ("rid", request.correlation_id.to_string()));
    }

    #[test]
    fn test_accepts_matching_ok_result_once() {
        let mut correlator = Correlator::new();
        let request = correlator.submit(Some(&still())).unwrap();
        assert!(correlator.is_sending());

        let result = ok_result(&request.correlation_id, "<section>A</section>");
        assert!(correlator.accept(&result));
        assert!(!correlator.is_sending());
        // A duplicate delivery of the same response is ignored
        assert!(!correlator.accept(&result));
    }

    #[test]
    fn test_rejects_not_ok_result() {
        let mut correlator = Correlator::new();
        let request = correlator.submit(Some(&still())).unwrap();
        let mut result = ok_result(&request.correlation_id, "x");
        result.ok = false;
        assert!(!correlator.accept(&result));
        assert!(correlator.is_sending());
    }

    #[test]
    fn test_older_id_rejected_after_newer_accepted() {
        let mut correlator = Correlator::new();
        let first = correlator.submit(Some(&still())).unwrap();
        let second = correlator.submit(Some(&still())).unwrap();
        assert_ne!(first.correlation_id, second.correlation_id);

        assert!(correlator.accept(&ok_result(&second.correlation_id, "new")));
        assert!(!correlator.accept(&ok_result(&first.correlation_id, "old")));
    }

    #[test]
    fn test_older_id_rejected_before_newer_arrives() {
        let mut correlator = Correlator::new();
        let first = correlator.submit(Some(&still())).unwrap();
        let second = correlator.submit(Some(&still())).unwrap();

        assert!(!correlator.accept(&ok_result(&first.correlation_id, "old")));
        assert!(correlator.accept(&ok_result(&second.correlation_id, "new")));
    }

    #[test]
    fn test_reset_makes_in_flight_inert() {
        let mut correlator = Correlator::new();
        let request = correlator.submit(Some(&still())).unwrap();
        correlator.reset();
        assert!(!correlator.accept(&ok_result(&request.correlation_id, "late")));
        assert!(!correlator.fail(&request.correlation_id));
    }

    #[test]
    fn test_fail_only_settles_current() {
        let mut correlator = Correlator::new();
        let first = correlator.submit(Some(&still())).unwrap();
        let second = correlator.submit(Some(&still())).unwrap();
        assert!(!correlator.fail(&first.correlation_id));
        assert!(correlator.fail(&second.correlation_id));
        assert!(!correlator.is_sending());
    }
}
