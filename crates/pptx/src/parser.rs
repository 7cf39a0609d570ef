//! PPTX package reader: slide order, slide size, and part access.

use crate::layout;
use crate::shapes::{parse_shape_tree, Shape};
use linker_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use zip::ZipArchive;

const PRESENTATION_PART: &str = "ppt/presentation.xml";
const PRESENTATION_RELS: &str = "ppt/_rels/presentation.xml.rels";

/// Slide size PowerPoint writes for a default 4:3 deck.
const DEFAULT_SLIDE_SIZE: (i64, i64) = (9_144_000, 6_858_000);

/// An opened PPTX package.
///
/// The original bytes are kept untouched; every read re-opens the archive
/// over them, and mutation always produces a new package.
#[derive(Debug, Clone)]
pub struct PptxDocument {
    bytes: Vec<u8>,
    slide_width: i64,
    slide_height: i64,
    slides: Vec<String>,
}

impl PptxDocument {
    /// Open a PPTX package from its raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let mut document = Self {
            bytes,
            slide_width: DEFAULT_SLIDE_SIZE.0,
            slide_height: DEFAULT_SLIDE_SIZE.1,
            slides: Vec::new(),
        };

        let presentation = document
            .read_part(PRESENTATION_PART)
            .map_err(|e| Error::PptxParseError(format!("Not a presentation package: {}", e)))?;
        let info = parse_presentation(&presentation)?;
        if let Some((cx, cy)) = info.slide_size {
            document.slide_width = cx;
            document.slide_height = cy;
        }

        let rels = parse_relationships(&document.read_part(PRESENTATION_RELS)?)?;
        document.slides = slide_order(&rels, &info.slide_rel_ids);

        log::debug!(
            "Opened presentation: {} slides, {}x{} EMU",
            document.slides.len(),
            document.slide_width,
            document.slide_height
        );

        Ok(document)
    }

    /// Open a PPTX package from a reader.
    pub fn open<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::from_bytes(bytes)
    }

    /// Open a PPTX package from disk.
    pub fn open_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::open(BufReader::new(file))
    }

    /// The package bytes this document was opened from.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }

    /// Declared slide width and height in EMU.
    pub fn slide_size_emu(&self) -> (i64, i64) {
        (self.slide_width, self.slide_height)
    }

    /// Part path of a 1-based slide.
    pub fn slide_part(&self, number: usize) -> Option<&str> {
        number
            .checked_sub(1)
            .and_then(|idx| self.slides.get(idx))
            .map(String::as_str)
    }

    /// Top-level shapes of a 1-based slide, in document order, exactly as the
    /// slide part declares them.
    pub fn raw_shapes(&self, number: usize) -> Result<Vec<Shape>> {
        let part = self.require_slide(number)?;
        parse_shape_tree(&self.read_part(part)?)
    }

    /// Top-level shapes of a 1-based slide, with placeholder geometry
    /// inherited from the layout and master where the slide omits it.
    pub fn shapes(&self, number: usize) -> Result<Vec<Shape>> {
        let part = self.require_slide(number)?;
        let mut shapes = parse_shape_tree(&self.read_part(part)?)?;
        layout::inherit_placeholder_geometry(self, part, &mut shapes)?;
        Ok(shapes)
    }

    fn require_slide(&self, number: usize) -> Result<&str> {
        self.slide_part(number).ok_or_else(|| {
            Error::PptxParseError(format!(
                "Slide {} out of range (1..={})",
                number,
                self.slides.len()
            ))
        })
    }

    pub(crate) fn archive(&self) -> Result<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(self.bytes.as_slice()))
            .map_err(|e| Error::ZipError(format!("Failed to open ZIP: {}", e)))
    }

    /// Read a part from the package as text.
    pub(crate) fn read_part(&self, path: &str) -> Result<String> {
        let mut archive = self.archive()?;
        let mut file = archive
            .by_name(path)
            .map_err(|e| Error::ZipError(format!("File not found in archive '{}': {}", path, e)))?;

        let mut content = String::new();
        file.read_to_string(&mut content)
            .map_err(|e| Error::ZipError(format!("Failed to read '{}': {}", path, e)))?;

        Ok(content)
    }

    /// Read and parse the relationships of a part. A part without a
    /// relationships file has no relationships.
    pub(crate) fn part_relationships(&self, part: &str) -> Result<Vec<Relationship>> {
        let rels_path = rels_path_for(part);
        let archive = self.archive()?;
        if !archive.file_names().any(|name| name == rels_path) {
            return Ok(Vec::new());
        }
        parse_relationships(&self.read_part(&rels_path)?)
    }
}

#[derive(Debug, Default)]
struct PresentationInfo {
    slide_size: Option<(i64, i64)>,
    slide_rel_ids: Vec<String>,
}

fn parse_presentation(xml: &str) -> Result<PresentationInfo> {
    let mut info = PresentationInfo::default();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                let name = e.name();
                match local_name(name.as_ref()) {
                    b"sldSz" => {
                        let mut cx = None;
                        let mut cy = None;
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value);
                            match attr.key.as_ref() {
                                b"cx" => cx = value.parse::<i64>().ok(),
                                b"cy" => cy = value.parse::<i64>().ok(),
                                _ => {}
                            }
                        }
                        if let (Some(cx), Some(cy)) = (cx, cy) {
                            info.slide_size = Some((cx, cy));
                        }
                    }
                    b"sldId" => {
                        // The relationship id is the namespaced `r:id`, not the numeric `id`.
                        for attr in e.attributes().flatten() {
                            let key = attr.key.as_ref();
                            if key.contains(&b':') && local_name(key) == b"id" {
                                info.slide_rel_ids
                                    .push(String::from_utf8_lossy(&attr.value).to_string());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing presentation.xml: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(info)
}

/// One entry of a `.rels` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

impl Relationship {
    fn is_slide(&self) -> bool {
        self.rel_type.ends_with("/slide")
    }
}

pub(crate) fn parse_relationships(xml: &str) -> Result<Vec<Relationship>> {
    let mut rels = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                let mut rel = Relationship {
                    id: String::new(),
                    rel_type: String::new(),
                    target: String::new(),
                };

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Type" => {
                            rel.rel_type = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        b"Target" => {
                            rel.target = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        b"Id" => {
                            rel.id = String::from_utf8_lossy(&attr.value).to_string();
                        }
                        _ => {}
                    }
                }

                rels.push(rel);
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlError(format!(
                    "Error parsing relationships: {}",
                    e
                )));
            }
            _ => {}
        }
    }

    Ok(rels)
}

/// Slide part paths in presentation order.
///
/// `p:sldIdLst` decides the order. Packages without one fall back to the
/// trailing number of the relationship id or target.
fn slide_order(rels: &[Relationship], slide_rel_ids: &[String]) -> Vec<String> {
    let slide_rels: Vec<&Relationship> = rels.iter().filter(|r| r.is_slide()).collect();

    if !slide_rel_ids.is_empty() {
        return slide_rel_ids
            .iter()
            .filter_map(|rid| {
                let found = slide_rels.iter().find(|r| &r.id == rid);
                if found.is_none() {
                    log::warn!("sldIdLst references unknown relationship {}", rid);
                }
                found
            })
            .map(|r| resolve_target(PRESENTATION_PART, &r.target))
            .collect();
    }

    let mut slides: Vec<(String, Option<usize>)> = slide_rels
        .iter()
        .map(|r| {
            let order_num = extract_slide_number(&r.target).or_else(|| extract_slide_number(&r.id));
            (resolve_target(PRESENTATION_PART, &r.target), order_num)
        })
        .collect();

    slides.sort_by(|a, b| match (a.1, b.1) {
        (Some(na), Some(nb)) => na.cmp(&nb),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.0.cmp(&b.0),
    });

    slides.into_iter().map(|(path, _)| path).collect()
}

/// Path of the relationships part belonging to `part`.
pub(crate) fn rels_path_for(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None => format!("_rels/{}.rels", part),
    }
}

/// Resolve a relationship target relative to the part that declares it.
pub(crate) fn resolve_target(base_part: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match base_part.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

/// Extract a slide number from a string like "rId2" or "slide3.xml".
fn extract_slide_number(s: &str) -> Option<usize> {
    let s = s.trim_end_matches(".xml").trim_end_matches(".rels");

    let digits: String = s.chars().rev().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let digits: String = digits.chars().rev().collect();
    digits.parse().ok()
}
