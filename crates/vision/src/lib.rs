//! Raster text-region detection through a remote multimodal recognition
//! service.
//!
//! Detection always yields at least one region: when the service cannot be
//! used, a single fallback region stands in and the failure is reported as
//! [`Detection::Degraded`].

pub mod backend;
pub mod config;
pub mod detector;
pub mod error;
pub mod parse;
pub mod request;

pub use backend::{HttpBackend, RecognitionBackend};
pub use config::VisionConfig;
pub use detector::{fallback_region, Detection, Detector};
pub use error::VisionError;
