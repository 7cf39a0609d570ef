//! Chat-completions wire format for the recognition call.

use crate::config::VisionConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Request body: one user message holding the image and the instruction.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    ImageUrl { image_url: ImageUrl },
    Text { text: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatRequest {
    /// Build the OCR request for `image`.
    pub fn ocr(config: &VisionConfig, image: &[u8]) -> Self {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(image));
        Self {
            model: config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url },
                    },
                    ContentPart::Text {
                        text: config.instruction.clone(),
                    },
                ],
            }],
            max_tokens: config.max_tokens,
        }
    }
}

/// The parts of a chat-completions response the detector reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    /// Either a plain string or a list of typed content parts.
    #[serde(default)]
    pub content: Option<serde_json::Value>,

    /// Some providers attach OCR output here instead of in `content`.
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

impl ResponseMessage {
    /// The textual content, with multi-part content joined.
    pub fn content_text(&self) -> Option<String> {
        match self.content.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(parts) => {
                let text: String = parts
                    .iter()
                    .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
                    .collect();
                Some(text)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub bounding_box: Option<AnnotationBox>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationBox {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub w: Option<f64>,
    pub h: Option<f64>,
}
