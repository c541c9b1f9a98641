use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::correlator::{CorrelationId, SubmissionRequest, SubmissionResult};
use crate::error::TransportError;

/// JSON body returned by the analysis service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub rid: CorrelationId,
}

impl From<AnalyzeResponse> for SubmissionResult {
    fn from(response: AnalyzeResponse) -> Self {
        SubmissionResult {
            correlation_id: response.rid,
            ok: response.ok,
            payload: response.html,
        }
    }
}

/// The remote service that turns a still image into a reading.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: SubmissionRequest) -> Result<SubmissionResult, TransportError>;
}

/// Form POST to an HTTP endpoint, JSON reply.
pub struct HttpAnalysisService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalysisService {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisService {
    async fn analyze(&self, request: SubmissionRequest) -> Result<SubmissionResult, TransportError> {
        log::debug!("POST {} rid={}", self.endpoint, request.correlation_id);
        let response = self
            .client
            .post(&self.endpoint)
            .form(&request.form_fields())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let parsed: AnalyzeResponse = serde_json::from_str(&body)?;
        log::debug!("Response rid={} ok={} ({} bytes of html)", parsed.rid, parsed.ok, parsed.html.len());
        Ok(parsed.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_decodes() {
        let json = r#"{"ok":true,"html":"<section>A</section>","rid":"1700000000000-abc123"}"#;
        let result: SubmissionResult = serde_json::from_str::<AnalyzeResponse>(json).unwrap().into();
        assert!(result.ok);
        assert_eq!(result.payload, "<section>A</section>");
        assert_eq!(result.correlation_id.as_str(), "1700000000000-abc123");
    }

    #[test]
    fn test_response_round_trips_rid_as_plain_string() {
        let response = AnalyzeResponse {
            ok: true,
            html: String::new(),
            rid: serde_json::from_str("\"42-zzzzzz\"").unwrap(),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["rid"], "42-zzzzzz");
    }

    #[test]
    fn test_missing_fields_default() {
        let response: AnalyzeResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response, AnalyzeResponse::default());
        let result = SubmissionResult::from(response);
        assert!(!result.ok);
        assert!(result.payload.is_empty());
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = serde_json::from_str::<AnalyzeResponse>("<html>").unwrap_err();
        assert!(matches!(TransportError::from(err), TransportError::Decode(_)));
    }
}
