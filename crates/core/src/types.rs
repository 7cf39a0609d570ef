//! Domain types shared by the extractor, the detector, and the mutator.

use serde::{Deserialize, Deserializer, Serialize};

/// English Metric Units per pixel (914400 EMU per inch at 96 DPI).
///
/// Shared by the region extractor and anything that renders the canvas, so
/// region coordinates always line up with the canvas.
pub const EMU_PER_PX: i64 = 9525;

/// Convert a length in EMU to whole pixels, flooring.
pub fn emu_to_px(emu: i64) -> i64 {
    emu.div_euclid(EMU_PER_PX)
}

/// A rectangular, identified area of interest within a slide or an image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// `Slide{n}-{shapeId}` for slide regions, `ImgBox{k}` for image regions.
    pub id: String,
    pub x: i64,
    pub y: i64,
    pub w: i64,
    pub h: i64,

    /// Recognized text. Only image regions carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Region {
    /// Create a region without recognized text.
    pub fn new(id: impl Into<String>, x: i64, y: i64, w: i64, h: i64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            w,
            h,
            text: None,
        }
    }

    /// Attach recognized text to this region.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Build the id of a slide region.
pub fn slide_region_id(slide_number: usize, shape_id: &str) -> String {
    format!("Slide{}-{}", slide_number, shape_id)
}

/// Build the id of the `k`-th (1-based) image region.
pub fn image_region_id(k: usize) -> String {
    format!("ImgBox{}", k)
}

/// One client-supplied correspondence from a region id to replacement text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub shape_id: String,

    /// Replacement text. Scalars other than strings are coerced to their
    /// display form (booleans as `True`/`False`); `null` or a missing field
    /// means "leave the shape alone".
    #[serde(default, deserialize_with = "display_text")]
    pub new_text: Option<String>,
}

impl MappingEntry {
    pub fn new(shape_id: impl Into<String>, new_text: Option<&str>) -> Self {
        Self {
            shape_id: shape_id.into(),
            new_text: new_text.map(str::to_string),
        }
    }
}

fn display_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Bool(b)) => Some(if b { "True" } else { "False" }.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

/// Decode a mapping submission (a JSON array of entries).
pub fn parse_mapping(json: &str) -> crate::Result<Vec<MappingEntry>> {
    serde_json::from_str(json).map_err(|e| crate::Error::InvalidMapping(e.to_string()))
}

/// The placeholder canvas and region metadata for one slide.
#[derive(Debug, Clone, Serialize)]
pub struct SlideCanvas {
    /// 1-based slide number after clamping.
    pub slide_number: usize,
    pub width_px: u32,
    pub height_px: u32,

    /// PNG-encoded flat canvas.
    #[serde(skip)]
    pub png: Vec<u8>,

    pub regions: Vec<Region>,
}

/// Why a mapping entry was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No shape in the document has this id.
    UnknownShape,
    /// The shape exists but cannot hold text (picture, table, group, ...).
    NoTextFrame,
    /// The entry carried no replacement text.
    NullText,
}

/// A mapping entry that was left out of the output document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub shape_id: String,
    pub reason: SkipReason,
}

/// Outcome of applying a mapping to a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Ids whose text was replaced, in submission order.
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedEntry>,
}

impl ApplyReport {
    pub fn skip(&mut self, shape_id: &str, reason: SkipReason) {
        self.skipped.push(SkippedEntry {
            shape_id: shape_id.to_string(),
            reason,
        });
    }
}

/// The format of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentFormat {
    /// Modern PPTX (Office Open XML).
    Pptx,
}

impl DocumentFormat {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pptx" => Some(Self::Pptx),
            _ => None,
        }
    }

    /// Detect format from file magic bytes.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        // PPTX is a ZIP file (PK\x03\x04)
        if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some(Self::Pptx);
        }
        None
    }

    /// Detect format from magic bytes, then from the extension.
    pub fn detect(bytes: &[u8], extension: Option<&str>) -> crate::Result<Self> {
        Self::from_magic(bytes)
            .or_else(|| extension.and_then(Self::from_extension))
            .ok_or_else(|| {
                crate::Error::UnsupportedFormat(extension.unwrap_or("no extension").to_string())
            })
    }

    /// Media type of the format, for download responses.
    pub fn media_type(&self) -> &'static str {
        match self {
            Self::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emu_to_px_floors() {
        assert_eq!(emu_to_px(952500), 100);
        assert_eq!(emu_to_px(9524), 0);
        assert_eq!(emu_to_px(9526), 1);
        assert_eq!(emu_to_px(-1), -1);
    }

    #[test]
    fn test_region_ids() {
        assert_eq!(slide_region_id(2, "5"), "Slide2-5");
        assert_eq!(image_region_id(1), "ImgBox1");
    }

    #[test]
    fn test_slide_region_serializes_without_text() {
        let json = serde_json::to_string(&Region::new("Slide1-2", 1, 2, 3, 4)).unwrap();
        assert_eq!(json, r#"{"id":"Slide1-2","x":1,"y":2,"w":3,"h":4}"#);

        let json = serde_json::to_string(&Region::new("ImgBox1", 0, 0, 100, 30).with_text("")).unwrap();
        assert!(json.ends_with(r#""text":""}"#));
    }

    #[test]
    fn test_mapping_coerces_scalars() {
        let entries = parse_mapping(
            r#"[
                {"shape_id": "Slide1-2", "new_text": "Hello"},
                {"shape_id": "Slide1-3", "new_text": 42},
                {"shape_id": "Slide1-4", "new_text": true},
                {"shape_id": "Slide1-5", "new_text": null},
                {"shape_id": "Slide1-6"}
            ]"#,
        )
        .unwrap();

        let texts: Vec<Option<&str>> = entries.iter().map(|e| e.new_text.as_deref()).collect();
        assert_eq!(
            texts,
            vec![Some("Hello"), Some("42"), Some("True"), None, None]
        );
    }

    #[test]
    fn test_mapping_booleans_display_capitalized() {
        let entries =
            parse_mapping(r#"[{"shape_id": "a", "new_text": false}, {"shape_id": "b", "new_text": 1.5}]"#)
                .unwrap();
        assert_eq!(entries[0].new_text.as_deref(), Some("False"));
        assert_eq!(entries[1].new_text.as_deref(), Some("1.5"));
    }

    #[test]
    fn test_mapping_rejects_non_array() {
        assert!(matches!(
            parse_mapping(r#"{"shape_id": "x"}"#),
            Err(crate::Error::InvalidMapping(_))
        ));
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(DocumentFormat::from_extension("PPTX"), Some(DocumentFormat::Pptx));
        assert_eq!(DocumentFormat::from_extension("ppt"), None);
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            DocumentFormat::detect(b"PK\x03\x04rest", Some("bin")).unwrap(),
            DocumentFormat::Pptx
        );
        assert_eq!(
            DocumentFormat::detect(b"", Some("pptx")).unwrap(),
            DocumentFormat::Pptx
        );
        assert!(matches!(
            DocumentFormat::detect(b"\xD0\xCF\x11\xE0", Some("ppt")),
            Err(crate::Error::UnsupportedFormat(ext)) if ext == "ppt"
        ));
        assert_eq!(
            DocumentFormat::from_magic(&[0x50, 0x4B, 0x03, 0x04, 0x14]),
            Some(DocumentFormat::Pptx)
        );
        assert_eq!(DocumentFormat::from_magic(b"\x89PNG"), None);
    }
}
