//! Core domain types, errors, and the session store for linking slide
//! regions to image regions.

pub mod error;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use session::{MappingStore, SessionId, SessionStore};
pub use types::{
    emu_to_px, image_region_id, parse_mapping, slide_region_id, ApplyReport, DocumentFormat,
    MappingEntry, Region, SkipReason, SkippedEntry, SlideCanvas, EMU_PER_PX,
};
