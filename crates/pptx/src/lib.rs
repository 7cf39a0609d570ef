//! PPTX (Office Open XML) backend for slide region linking.
//!
//! Opens .pptx packages, enumerates the shapes of each slide as addressable
//! regions, and writes mapped text back into a new package.

pub mod apply;
pub mod extract;
mod layout;
pub mod parser;
pub mod shapes;

#[cfg(test)]
pub(crate) mod fixtures;

pub use apply::{apply, apply_with_report};
pub use extract::{clamp_slide_number, extract_regions, render_placeholder};
pub use parser::PptxDocument;
pub use shapes::{Geometry, Placeholder, Shape, ShapeKind};
