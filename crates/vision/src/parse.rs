//! Turning the model's answer into image regions.

use crate::error::VisionError;
use crate::request::{Annotation, ChatResponse};
use linker_core::{image_region_id, Region};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Matches a whole answer wrapped in a Markdown code fence.
static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*(.*?)\s*```\s*$").unwrap());

/// Default annotation box size when the provider leaves it out.
const ANNOTATION_DEFAULT_W: f64 = 100.0;
const ANNOTATION_DEFAULT_H: f64 = 20.0;

#[derive(Debug, Deserialize)]
struct RawBox {
    #[serde(default)]
    id: Option<Value>,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    #[serde(default)]
    text: Option<String>,
}

impl RawBox {
    /// The service-assigned id, if it gave a usable one.
    fn given_id(&self) -> Option<String> {
        match &self.id {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn into_region(self, id: String) -> Region {
        Region::new(id, to_px(self.x), to_px(self.y), to_px(self.w), to_px(self.h))
            .with_text(self.text.unwrap_or_default())
    }
}

/// Truncate a coordinate to whole pixels; negative or non-finite become 0.
fn to_px(v: f64) -> i64 {
    if v.is_finite() && v > 0.0 {
        v as i64
    } else {
        0
    }
}

/// Regions described by a recognition response.
///
/// The message content is read first; annotation boxes are used when the
/// content holds no usable list.
pub fn regions_from_response(response: &ChatResponse) -> Result<Vec<Region>, VisionError> {
    let message = response
        .choices
        .first()
        .map(|c| &c.message)
        .ok_or_else(|| VisionError::MalformedResponse("response has no choices".to_string()))?;

    let parsed = match message.content_text() {
        Some(content) => parse_content(&content),
        None => Err(VisionError::MalformedResponse(
            "message has no text content".to_string(),
        )),
    };

    match parsed {
        Ok(regions) if !regions.is_empty() => Ok(regions),
        other => match annotation_regions(&message.annotations) {
            Some(regions) => Ok(regions),
            None => other.and(Err(VisionError::EmptyResult)),
        },
    }
}

/// Parse the model's text answer: a JSON array of boxes, optionally fenced
/// or wrapped in an object under `boxes` or `regions`.
pub fn parse_content(content: &str) -> Result<Vec<Region>, VisionError> {
    let body = CODE_FENCE
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());

    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| VisionError::MalformedResponse(format!("content is not JSON: {}", e)))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("boxes").or_else(|| map.remove("regions")) {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(VisionError::MalformedResponse(
                    "expected a JSON array of boxes".to_string(),
                ))
            }
        },
        _ => {
            return Err(VisionError::MalformedResponse(
                "expected a JSON array of boxes".to_string(),
            ))
        }
    };

    let boxes = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<RawBox>(item)
                .map_err(|e| VisionError::MalformedResponse(format!("box {}: {}", i + 1, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Generated ids must not collide with ids the service assigned.
    let mut taken: HashSet<String> = boxes.iter().filter_map(RawBox::given_id).collect();
    let mut next = 1;

    Ok(boxes
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let id = raw.given_id().unwrap_or_else(|| {
                next = next.max(i + 1);
                while taken.contains(&image_region_id(next)) {
                    next += 1;
                }
                let id = image_region_id(next);
                taken.insert(id.clone());
                id
            });
            raw.into_region(id)
        })
        .collect())
}

fn annotation_regions(annotations: &[Annotation]) -> Option<Vec<Region>> {
    let regions: Vec<Region> = annotations
        .iter()
        .filter_map(|a| a.bounding_box.as_ref().map(|b| (b, a.text.as_deref())))
        .enumerate()
        .map(|(i, (b, text))| {
            Region::new(
                image_region_id(i + 1),
                to_px(b.x.unwrap_or(0.0)),
                to_px(b.y.unwrap_or(0.0)),
                to_px(b.w.unwrap_or(ANNOTATION_DEFAULT_W)),
                to_px(b.h.unwrap_or(ANNOTATION_DEFAULT_H)),
            )
            .with_text(text.unwrap_or_default())
        })
        .collect();

    if regions.is_empty() {
        None
    } else {
        Some(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(message: &str) -> ChatResponse {
        serde_json::from_str(&format!(r#"{{"choices": [{{"message": {}}}]}}"#, message)).unwrap()
    }

    #[test]
    fn test_plain_array() {
        let regions = parse_content(
            r#"[{"id": "title", "x": 10, "y": 20, "w": 300, "h": 40, "text": "Quarterly results"}]"#,
        )
        .unwrap();
        assert_eq!(
            regions,
            vec![Region::new("title", 10, 20, 300, 40).with_text("Quarterly results")]
        );
    }

    #[test]
    fn test_missing_ids_are_numbered() {
        let regions = parse_content(
            r#"[{"x": 0, "y": 0, "w": 1, "h": 1, "text": "a"},
                {"id": 7, "x": 0, "y": 0, "w": 1, "h": 1, "text": "b"},
                {"id": "", "x": 0, "y": 0, "w": 1, "h": 1}]"#,
        )
        .unwrap();
        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ImgBox1", "7", "ImgBox3"]);
        assert_eq!(regions[2].text.as_deref(), Some(""));
    }

    #[test]
    fn test_generated_ids_skip_service_ids() {
        let regions = parse_content(
            r#"[{"id": "ImgBox2", "x": 0, "y": 0, "w": 1, "h": 1, "text": "a"},
                {"x": 0, "y": 0, "w": 1, "h": 1, "text": "b"},
                {"x": 0, "y": 0, "w": 1, "h": 1, "text": "c"},
                {"id": "ImgBox3", "x": 0, "y": 0, "w": 1, "h": 1, "text": "d"}]"#,
        )
        .unwrap();
        let ids: Vec<&str> = regions.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["ImgBox2", "ImgBox4", "ImgBox5", "ImgBox3"]);
    }

    #[test]
    fn test_fenced_and_wrapped_content() {
        let fenced = "```json\n[{\"x\": 1.9, \"y\": -4, \"w\": 5.5, \"h\": 6, \"text\": \"t\"}]\n```";
        assert_eq!(
            parse_content(fenced).unwrap(),
            vec![Region::new("ImgBox1", 1, 0, 5, 6).with_text("t")]
        );

        let wrapped = r#"{"boxes": [{"x": 1, "y": 2, "w": 3, "h": 4, "text": "w"}]}"#;
        assert_eq!(parse_content(wrapped).unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_content() {
        for content in [
            "Sorry, I cannot read this image.",
            r#"{"answer": 42}"#,
            r#"[{"x": 1, "y": 2}]"#,
            "\"just a string\"",
        ] {
            assert!(
                matches!(parse_content(content), Err(VisionError::MalformedResponse(_))),
                "{}",
                content
            );
        }
    }

    #[test]
    fn test_response_without_choices() {
        let empty: ChatResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(matches!(
            regions_from_response(&empty),
            Err(VisionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_list_is_an_error() {
        assert!(matches!(
            regions_from_response(&response(r#"{"content": "[]"}"#)),
            Err(VisionError::EmptyResult)
        ));
    }

    #[test]
    fn test_annotations_used_when_content_unusable() {
        let regions = regions_from_response(&response(
            r#"{"content": "see annotations",
                "annotations": [
                    {"type": "ocr", "bounding_box": {"x": 5, "y": 6}, "text": "hi"},
                    {"type": "url_citation"}
                ]}"#,
        ))
        .unwrap();
        assert_eq!(regions, vec![Region::new("ImgBox1", 5, 6, 100, 20).with_text("hi")]);
    }
}
