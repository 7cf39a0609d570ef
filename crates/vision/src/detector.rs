//! Raster region detection with a guaranteed non-empty result.

use crate::backend::{HttpBackend, RecognitionBackend};
use crate::config::VisionConfig;
use crate::error::VisionError;
use crate::parse::regions_from_response;
use crate::request::ChatRequest;
use linker_core::{image_region_id, Region};
use std::path::Path;

/// The single region returned whenever recognition fails.
///
/// It says nothing about the image; it only guarantees the mapping UI a
/// target.
pub fn fallback_region() -> Region {
    Region::new(image_region_id(1), 0, 0, 100, 30).with_text("")
}

/// Outcome of a detection attempt. Both variants carry usable regions.
#[derive(Debug)]
pub enum Detection {
    /// Regions reported by the recognition service.
    Recognized(Vec<Region>),
    /// Recognition failed; `regions` is the fallback.
    Degraded {
        regions: Vec<Region>,
        reason: VisionError,
    },
}

impl Detection {
    pub fn degraded(reason: VisionError) -> Self {
        Self::Degraded {
            regions: vec![fallback_region()],
            reason,
        }
    }

    pub fn regions(&self) -> &[Region] {
        match self {
            Self::Recognized(regions) | Self::Degraded { regions, .. } => regions,
        }
    }

    pub fn into_regions(self) -> Vec<Region> {
        match self {
            Self::Recognized(regions) | Self::Degraded { regions, .. } => regions,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Why detection degraded, if it did.
    pub fn reason(&self) -> Option<&VisionError> {
        match self {
            Self::Recognized(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

/// Detects text regions in images through a recognition backend.
pub struct Detector<B = HttpBackend> {
    config: VisionConfig,
    backend: B,
}

impl Detector<HttpBackend> {
    /// A detector talking HTTP to `config.endpoint`.
    pub fn new(config: VisionConfig) -> Self {
        let backend = HttpBackend::new(config.endpoint.clone(), config.timeout);
        Self { config, backend }
    }
}

impl<B: RecognitionBackend> Detector<B> {
    pub fn with_backend(config: VisionConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &VisionConfig {
        &self.config
    }

    /// Detect regions in encoded image bytes. Never fails: any problem with
    /// the credential, the service, or its answer yields the fallback region.
    pub fn detect_regions(&self, image: &[u8]) -> Detection {
        match self.try_detect(image) {
            Ok(regions) => {
                log::debug!("Recognized {} regions", regions.len());
                Detection::Recognized(regions)
            }
            Err(reason) => {
                log::warn!("Recognition degraded to fallback region: {}", reason);
                Detection::degraded(reason)
            }
        }
    }

    /// Detect regions in an image file; an unreadable file also degrades.
    pub fn detect_file(&self, path: &Path) -> Detection {
        match std::fs::read(path) {
            Ok(bytes) => self.detect_regions(&bytes),
            Err(e) => {
                log::warn!("Cannot read image {}: {}", path.display(), e);
                Detection::degraded(VisionError::ImageUnreadable(e))
            }
        }
    }

    fn try_detect(&self, image: &[u8]) -> Result<Vec<Region>, VisionError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(VisionError::MissingCredential)?;

        let request = ChatRequest::ocr(&self.config, image);
        let response = self.backend.complete(&request, api_key)?;
        regions_from_response(&response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ChatResponse;
    use std::cell::RefCell;
    use std::time::Duration;

    /// Answers every request with a fixed response body.
    struct Canned(&'static str);

    impl RecognitionBackend for Canned {
        fn complete(&self, _: &ChatRequest, _: &str) -> Result<ChatResponse, VisionError> {
            serde_json::from_str(self.0).map_err(|e| VisionError::MalformedResponse(e.to_string()))
        }
    }

    /// Fails every request with an HTTP status.
    struct Failing(u16);

    impl RecognitionBackend for Failing {
        fn complete(&self, _: &ChatRequest, _: &str) -> Result<ChatResponse, VisionError> {
            Err(VisionError::Status(self.0))
        }
    }

    /// Records what it was sent.
    #[derive(Default)]
    struct Recording {
        seen: RefCell<Vec<(String, String)>>,
    }

    impl RecognitionBackend for Recording {
        fn complete(&self, request: &ChatRequest, api_key: &str) -> Result<ChatResponse, VisionError> {
            self.seen
                .borrow_mut()
                .push((request.model.clone(), api_key.to_string()));
            Ok(ChatResponse::default())
        }
    }

    fn keyed() -> VisionConfig {
        VisionConfig::default().with_api_key("sk-test")
    }

    fn assert_fallback(detection: &Detection) {
        assert!(detection.is_degraded());
        assert_eq!(detection.regions(), &[fallback_region()]);
    }

    #[test]
    fn test_fallback_region_values() {
        assert_eq!(
            fallback_region(),
            Region::new("ImgBox1", 0, 0, 100, 30).with_text("")
        );
    }

    #[test]
    fn test_recognized_regions() {
        let detector = Detector::with_backend(
            keyed(),
            Canned(
                r#"{"choices": [{"message": {"role": "assistant", "content": "[{\"id\": \"a\", \"x\": 1, \"y\": 2, \"w\": 3, \"h\": 4, \"text\": \"Hello\"}, {\"x\": 5, \"y\": 6, \"w\": 7, \"h\": 8, \"text\": \"World\"}]"}}]}"#,
            ),
        );

        let detection = detector.detect_regions(b"image");
        assert!(!detection.is_degraded());
        assert_eq!(
            detection.into_regions(),
            vec![
                Region::new("a", 1, 2, 3, 4).with_text("Hello"),
                Region::new("ImgBox2", 5, 6, 7, 8).with_text("World"),
            ]
        );
    }

    #[test]
    fn test_missing_credential_degrades_without_calling() {
        let backend = Recording::default();
        let detector = Detector::with_backend(VisionConfig::default(), backend);

        let detection = detector.detect_regions(b"image");
        assert_fallback(&detection);
        assert!(matches!(detection.reason(), Some(VisionError::MissingCredential)));
        assert!(detector.backend.seen.borrow().is_empty());
    }

    #[test]
    fn test_credential_is_forwarded() {
        let detector = Detector::with_backend(keyed(), Recording::default());
        let detection = detector.detect_regions(b"image");

        // The recorded response has no choices, so it degrades too.
        assert_fallback(&detection);
        assert_eq!(
            detector.backend.seen.borrow().as_slice(),
            &[("mistral-vision-ocr".to_string(), "sk-test".to_string())]
        );
    }

    #[test]
    fn test_http_failure_degrades() {
        let detection = Detector::with_backend(keyed(), Failing(503)).detect_regions(b"image");
        assert_fallback(&detection);
        assert!(matches!(detection.reason(), Some(VisionError::Status(503))));
    }

    #[test]
    fn test_malformed_content_degrades() {
        let detection = Detector::with_backend(
            keyed(),
            Canned(r#"{"choices": [{"message": {"content": "I see a slide with a chart."}}]}"#),
        )
        .detect_regions(b"image");
        assert_fallback(&detection);
        assert!(matches!(
            detection.reason(),
            Some(VisionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_non_json_body_degrades() {
        let detection =
            Detector::with_backend(keyed(), Canned("<html>Bad Gateway</html>")).detect_regions(b"x");
        assert_fallback(&detection);
    }

    #[test]
    fn test_unreachable_service_degrades() {
        let config = keyed()
            .with_endpoint("http://127.0.0.1:9/v1/chat/completions")
            .with_timeout(Duration::from_secs(2));
        let detection = Detector::new(config).detect_regions(b"image");

        assert_fallback(&detection);
        assert!(matches!(detection.reason(), Some(VisionError::Transport(_))));
    }

    #[test]
    fn test_unreadable_file_degrades() {
        let detector = Detector::with_backend(keyed(), Failing(500));
        let detection = detector.detect_file(Path::new("/nonexistent/reference.png"));

        assert_fallback(&detection);
        assert!(matches!(
            detection.reason(),
            Some(VisionError::ImageUnreadable(_))
        ));
    }
}
