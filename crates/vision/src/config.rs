//! Recognition service configuration.

use std::fmt;
use std::time::Duration;

/// OpenAI-compatible chat-completions endpoint used by default.
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Vision model asked for OCR boxes.
pub const DEFAULT_MODEL: &str = "mistral-vision-ocr";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Prompt sent next to the image.
pub const OCR_INSTRUCTION: &str = "Find every region of text in this image. \
Respond with only a JSON array, one object per region, with the keys \
id (string), x, y, w, h (integer pixel bounding box, origin at the top-left corner) \
and text (the recognized text).";

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
pub const ENDPOINT_VAR: &str = "SLIDE_LINKER_OCR_ENDPOINT";
pub const MODEL_VAR: &str = "SLIDE_LINKER_OCR_MODEL";
pub const TIMEOUT_VAR: &str = "SLIDE_LINKER_OCR_TIMEOUT_SECS";

/// Settings for the remote recognition call.
#[derive(Clone)]
pub struct VisionConfig {
    pub endpoint: String,
    pub model: String,
    /// Bearer credential. Detection degrades immediately without one.
    pub api_key: Option<String>,
    /// Upper bound for the whole request, connect included.
    pub timeout: Duration,
    pub max_tokens: u32,
    pub instruction: String,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
            max_tokens: DEFAULT_MAX_TOKENS,
            instruction: OCR_INSTRUCTION.to_string(),
        }
    }
}

impl fmt::Debug for VisionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl VisionConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        config.api_key = non_empty(API_KEY_VAR);
        if let Some(endpoint) = non_empty(ENDPOINT_VAR) {
            config.endpoint = endpoint;
        }
        if let Some(model) = non_empty(MODEL_VAR) {
            config.model = model;
        }
        if let Some(raw) = non_empty(TIMEOUT_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout = Duration::from_secs(secs),
                _ => log::warn!("Ignoring invalid {}={:?}", TIMEOUT_VAR, raw),
            }
        }
        config
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request timeout; a zero timeout is raised to one second.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_secs(1));
        self
    }
}
