//! Transport to the recognition service.

use crate::error::VisionError;
use crate::request::{ChatRequest, ChatResponse};
use std::time::Duration;

/// Sends one recognition request and returns the decoded response.
pub trait RecognitionBackend {
    fn complete(&self, request: &ChatRequest, api_key: &str) -> Result<ChatResponse, VisionError>;
}

/// Blocking HTTP client for an OpenAI-compatible endpoint.
///
/// One attempt per call, bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    endpoint: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

impl RecognitionBackend for HttpBackend {
    fn complete(&self, request: &ChatRequest, api_key: &str) -> Result<ChatResponse, VisionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;

        log::debug!("POST {} (model {})", self.endpoint, request.model);
        let response = client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Status(status.as_u16()));
        }

        let body = response.text()?;
        serde_json::from_str(&body).map_err(|e| VisionError::MalformedResponse(e.to_string()))
    }
}
