//! Error types for slide region linking.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while extracting regions or applying mappings.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to open or read the input file.
    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file format is not supported or could not be detected.
    #[error("Unsupported or unrecognized file format: {0}")]
    UnsupportedFormat(String),

    /// The PPTX package is structurally invalid.
    #[error("PPTX parsing error: {0}")]
    PptxParseError(String),

    /// The presentation contains no slides, so there is nothing to clamp to.
    #[error("Presentation has no slides")]
    NoSlides,

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    ZipError(String),

    /// XML parsing or writing error.
    #[error("XML error: {0}")]
    XmlError(String),

    /// Failed to encode the placeholder canvas.
    #[error("Canvas encoding error: {0}")]
    CanvasError(String),

    /// No document was registered under this session id.
    #[error("Unknown document session: {0}")]
    SessionNotFound(String),

    /// No image was registered under this id.
    #[error("Unknown image id: {0}")]
    ImageNotFound(String),

    /// A mapping submission could not be decoded.
    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),
}
