//! Reasons a recognition attempt can fail.

use thiserror::Error;

/// Why the detector fell back to its placeholder region.
#[derive(Error, Debug)]
pub enum VisionError {
    /// No API key is configured for the recognition service.
    #[error("No recognition service credential configured")]
    MissingCredential,

    /// The image could not be read from disk.
    #[error("Failed to read image: {0}")]
    ImageUnreadable(#[from] std::io::Error),

    /// The request could not be sent or timed out.
    #[error("Recognition request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success HTTP status.
    #[error("Recognition service returned HTTP {0}")]
    Status(u16),

    /// The response did not contain the expected box list.
    #[error("Malformed recognition response: {0}")]
    MalformedResponse(String),

    /// The service answered with an empty box list.
    #[error("Recognition service found no text regions")]
    EmptyResult,
}
