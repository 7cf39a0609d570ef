//! Shape enumeration over a slide's shape tree.
//!
//! Only direct children of `p:spTree` are shapes; members of a group are
//! part of the group and never addressable on their own.

use crate::parser::local_name;
use linker_core::{emu_to_px, slide_region_id, Error, Region, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Character standing in for a soft line break (`a:br`) in shape text.
pub const LINE_BREAK: char = '\u{000B}';

/// Element a shape is stored as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeElement {
    Sp,
    Pic,
    GraphicFrame,
    GroupSp,
    CxnSp,
    ContentPart,
}

impl ShapeElement {
    pub fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"sp" => Some(Self::Sp),
            b"pic" => Some(Self::Pic),
            b"graphicFrame" => Some(Self::GraphicFrame),
            b"grpSp" => Some(Self::GroupSp),
            b"cxnSp" => Some(Self::CxnSp),
            b"contentPart" => Some(Self::ContentPart),
            _ => None,
        }
    }
}

/// Kind of a shape, following the PowerPoint object model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    TextBox,
    Picture,
    Placeholder,
    AutoShape,
    Freeform,
    Media,
    Table,
    Chart,
    GraphicFrame,
    Group,
    Connector,
    ContentPart,
}

impl ShapeKind {
    /// Whether shapes of this kind are offered as mapping regions.
    pub fn is_region(&self) -> bool {
        matches!(self, Self::TextBox | Self::Picture | Self::Placeholder)
    }
}

/// Position and size in EMU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Geometry {
    pub x: i64,
    pub y: i64,
    pub cx: i64,
    pub cy: i64,
}

/// Placeholder reference from `p:nvPr/p:ph`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// `type` attribute; `obj` when absent.
    pub ph_type: String,
    /// `idx` attribute; `0` when absent.
    pub idx: u32,
}

/// A top-level shape on a slide, layout, or master.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    /// `cNvPr/@id`, kept verbatim.
    pub id: String,
    pub name: String,
    pub element: ShapeElement,
    pub kind: ShapeKind,
    /// `None` when the shape has no transform of its own.
    pub geometry: Option<Geometry>,
    pub placeholder: Option<Placeholder>,
    /// Paragraphs joined by `\n`, soft breaks as [`LINE_BREAK`].
    /// `None` when the shape has no text body.
    pub text: Option<String>,
}

impl Shape {
    /// Only `p:sp` shapes carry a text frame; one is created on demand when
    /// text is written to an `p:sp` without a body.
    pub fn has_text_frame(&self) -> bool {
        self.element == ShapeElement::Sp
    }

    /// The region this shape occupies on slide `slide_number`.
    pub fn region(&self, slide_number: usize) -> Region {
        let g = self.geometry.unwrap_or_default();
        Region::new(
            slide_region_id(slide_number, &self.id),
            emu_to_px(g.x),
            emu_to_px(g.y),
            emu_to_px(g.cx),
            emu_to_px(g.cy),
        )
    }
}

#[derive(Debug)]
struct ShapeBuilder {
    depth: usize,
    element: ShapeElement,
    id: Option<String>,
    name: String,
    text_box: bool,
    custom_geometry: bool,
    media: bool,
    graphic_uri: Option<String>,
    placeholder: Option<Placeholder>,
    xfrm_depth: Option<usize>,
    geometry: Option<Geometry>,
    text: Option<String>,
    paragraphs: usize,
}

impl ShapeBuilder {
    fn new(depth: usize, element: ShapeElement) -> Self {
        Self {
            depth,
            element,
            id: None,
            name: String::new(),
            text_box: false,
            custom_geometry: false,
            media: false,
            graphic_uri: None,
            placeholder: None,
            xfrm_depth: None,
            geometry: None,
            text: None,
            paragraphs: 0,
        }
    }

    /// Record what an opening (or empty) descendant element says about the
    /// shape. `stack` holds the local names of the open ancestors.
    fn visit(&mut self, stack: &[Vec<u8>], e: &BytesStart) {
        let name = e.name();
        let local = local_name(name.as_ref());
        let d = self.depth;
        let rel = stack.len() - d;
        let child = |offset: usize| stack.get(d + offset).map(Vec::as_slice);
        let in_nv = child(1).is_some_and(|n| n.starts_with(b"nv"));

        match local {
            b"cNvPr" if rel == 2 && in_nv && self.id.is_none() => {
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"id" => self.id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"name" => self.name = String::from_utf8_lossy(&attr.value).to_string(),
                        _ => {}
                    }
                }
            }
            b"cNvSpPr" if rel == 2 && in_nv => {
                self.text_box = e
                    .attributes()
                    .flatten()
                    .any(|a| a.key.as_ref() == b"txBox" && matches!(a.value.as_ref(), b"1" | b"true"));
            }
            b"ph" if rel == 3 && in_nv && child(2) == Some(b"nvPr".as_slice()) => {
                let mut ph = Placeholder {
                    ph_type: "obj".to_string(),
                    idx: 0,
                };
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value);
                    match attr.key.as_ref() {
                        b"type" => ph.ph_type = value.to_string(),
                        b"idx" => ph.idx = value.parse().unwrap_or(0),
                        _ => {}
                    }
                }
                self.placeholder = Some(ph);
            }
            b"videoFile" | b"audioFile" | b"quickTimeFile" | b"wavAudioFile" | b"audioCd"
                if rel == 3 && in_nv =>
            {
                self.media = true;
            }
            b"xfrm" if self.xfrm_depth.is_none() && self.geometry.is_none() => {
                let own = (rel == 1 && self.element == ShapeElement::GraphicFrame)
                    || (rel == 2 && matches!(child(1), Some(b"spPr") | Some(b"grpSpPr")));
                if own {
                    self.xfrm_depth = Some(stack.len());
                }
            }
            b"off" | b"ext" if self.xfrm_depth.is_some_and(|x| stack.len() == x + 1) => {
                let geometry = self.geometry.get_or_insert_with(Geometry::default);
                for attr in e.attributes().flatten() {
                    let Ok(value) = String::from_utf8_lossy(&attr.value).parse::<i64>() else {
                        continue;
                    };
                    match (local, attr.key.as_ref()) {
                        (b"off", b"x") => geometry.x = value,
                        (b"off", b"y") => geometry.y = value,
                        (b"ext", b"cx") => geometry.cx = value,
                        (b"ext", b"cy") => geometry.cy = value,
                        _ => {}
                    }
                }
            }
            b"custGeom" if rel == 2 && child(1) == Some(b"spPr".as_slice()) => {
                self.custom_geometry = true;
            }
            b"graphicData" if self.graphic_uri.is_none() => {
                self.graphic_uri = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"uri")
                    .map(|a| String::from_utf8_lossy(&a.value).to_string());
            }
            b"txBody" if rel == 1 => {
                self.text.get_or_insert_with(String::new);
            }
            b"p" if rel == 2 && child(1) == Some(b"txBody".as_slice()) => {
                if self.paragraphs > 0 {
                    if let Some(text) = self.text.as_mut() {
                        text.push('\n');
                    }
                }
                self.paragraphs += 1;
            }
            b"br" if rel == 3 && child(1) == Some(b"txBody".as_slice()) => {
                if let Some(text) = self.text.as_mut() {
                    text.push(LINE_BREAK);
                }
            }
            _ => {}
        }
    }

    fn leave(&mut self, stack_len_after_pop: usize) {
        if self.xfrm_depth == Some(stack_len_after_pop) {
            self.xfrm_depth = None;
        }
    }

    fn push_text(&mut self, stack: &[Vec<u8>], text: &str) {
        let in_run_text = stack.last().is_some_and(|n| n.as_slice() == b"t")
            && stack.get(self.depth + 1).is_some_and(|n| n.as_slice() == b"txBody");
        if in_run_text {
            if let Some(body) = self.text.as_mut() {
                body.push_str(text);
            }
        }
    }

    fn finish(self) -> Option<Shape> {
        let Some(id) = self.id else {
            log::debug!("Skipping shape without cNvPr id");
            return None;
        };

        let kind = match self.element {
            _ if self.placeholder.is_some()
                && matches!(
                    self.element,
                    ShapeElement::Sp | ShapeElement::Pic | ShapeElement::GraphicFrame
                ) =>
            {
                ShapeKind::Placeholder
            }
            ShapeElement::Sp if self.custom_geometry => ShapeKind::Freeform,
            ShapeElement::Sp if self.text_box => ShapeKind::TextBox,
            ShapeElement::Sp => ShapeKind::AutoShape,
            ShapeElement::Pic if self.media => ShapeKind::Media,
            ShapeElement::Pic => ShapeKind::Picture,
            ShapeElement::GraphicFrame => match self.graphic_uri.as_deref() {
                Some(uri) if uri.ends_with("/table") => ShapeKind::Table,
                Some(uri) if uri.ends_with("/chart") => ShapeKind::Chart,
                _ => ShapeKind::GraphicFrame,
            },
            ShapeElement::GroupSp => ShapeKind::Group,
            ShapeElement::CxnSp => ShapeKind::Connector,
            ShapeElement::ContentPart => ShapeKind::ContentPart,
        };

        Some(Shape {
            id,
            name: self.name,
            element: self.element,
            kind,
            geometry: self.geometry,
            placeholder: self.placeholder,
            text: self.text,
        })
    }
}

/// Parse the top-level shapes of a slide, layout, or master part, in
/// document order.
pub fn parse_shape_tree(xml: &str) -> Result<Vec<Shape>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut shapes = Vec::new();
    let mut current: Option<ShapeBuilder> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            Error::XmlError(format!(
                "Error parsing shape tree at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(ref e) => {
                let local = local_name(e.name().as_ref()).to_vec();
                open_element(&stack, e, &mut current);
                stack.push(local);
            }
            Event::Empty(ref e) => {
                open_element(&stack, e, &mut current);
                close_element(&stack, &mut current, &mut shapes);
            }
            Event::End(_) => {
                stack.pop();
                close_element(&stack, &mut current, &mut shapes);
            }
            Event::Text(ref t) => {
                if let Some(builder) = current.as_mut() {
                    let text = t.unescape().unwrap_or_default();
                    builder.push_text(&stack, &text);
                }
            }
            Event::CData(ref t) => {
                if let Some(builder) = current.as_mut() {
                    builder.push_text(&stack, &String::from_utf8_lossy(t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes)
}

/// Whether an element opened under `stack` is a top-level shape.
pub(crate) fn top_level_shape(stack: &[Vec<u8>], local: &[u8]) -> Option<ShapeElement> {
    if stack.last().map(Vec::as_slice) != Some(b"spTree".as_slice()) {
        return None;
    }
    ShapeElement::from_local_name(local)
}

fn open_element(stack: &[Vec<u8>], e: &BytesStart, current: &mut Option<ShapeBuilder>) {
    match current {
        Some(builder) => builder.visit(stack, e),
        None => {
            if let Some(element) = top_level_shape(stack, local_name(e.name().as_ref())) {
                *current = Some(ShapeBuilder::new(stack.len(), element));
            }
        }
    }
}

fn close_element(
    stack: &[Vec<u8>],
    current: &mut Option<ShapeBuilder>,
    shapes: &mut Vec<Shape>,
) {
    let Some(builder) = current.as_mut() else {
        return;
    };

    if builder.depth == stack.len() {
        if let Some(shape) = current.take().and_then(ShapeBuilder::finish) {
            shapes.push(shape);
        }
    } else {
        builder.leave(stack.len());
    }
}
