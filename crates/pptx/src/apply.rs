//! Writing mapped text back into a presentation.
//!
//! The region-id lookup is rebuilt from the package on every call, with the
//! same slide and shape enumeration the extractor uses. Only slide parts that
//! receive an edit are re-serialized; every other part is copied raw.

use crate::parser::{local_name, PptxDocument};
use crate::shapes::{top_level_shape, ShapeElement, LINE_BREAK};
use linker_core::{slide_region_id, ApplyReport, Error, MappingEntry, Result, SkipReason};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const DRAWING_PREFIX: &str = "a:";

/// Where a region id points inside the package.
#[derive(Debug, Clone)]
struct ShapeTarget {
    slide: usize,
    shape_id: String,
    has_text_frame: bool,
}

/// Apply `entries` to `document` and return the new package bytes.
///
/// Entries naming an unknown shape, a shape without a text frame, or no
/// replacement text are ignored.
pub fn apply(document: &PptxDocument, entries: &[MappingEntry]) -> Result<Vec<u8>> {
    apply_with_report(document, entries).map(|(bytes, _)| bytes)
}

/// Like [`apply`], also reporting which entries were applied or skipped.
pub fn apply_with_report(
    document: &PptxDocument,
    entries: &[MappingEntry],
) -> Result<(Vec<u8>, ApplyReport)> {
    let lookup = shape_lookup(document)?;
    let mut report = ApplyReport::default();

    // slide number -> shape id -> replacement text; later entries win
    let mut edits: BTreeMap<usize, HashMap<String, String>> = BTreeMap::new();

    for entry in entries {
        let Some(target) = lookup.get(&entry.shape_id) else {
            log::warn!("Skipping mapping for unknown shape {}", entry.shape_id);
            report.skip(&entry.shape_id, SkipReason::UnknownShape);
            continue;
        };
        let Some(text) = entry.new_text.as_ref() else {
            report.skip(&entry.shape_id, SkipReason::NullText);
            continue;
        };
        if !target.has_text_frame {
            log::warn!("Skipping mapping for {}: shape has no text frame", entry.shape_id);
            report.skip(&entry.shape_id, SkipReason::NoTextFrame);
            continue;
        }

        edits
            .entry(target.slide)
            .or_default()
            .insert(target.shape_id.clone(), text.clone());
        report.applied.push(entry.shape_id.clone());
    }

    let mut rewritten: HashMap<String, Vec<u8>> = HashMap::new();
    for (slide, shape_edits) in &edits {
        let Some(part) = document.slide_part(*slide) else {
            continue;
        };
        let xml = document.read_part(part)?;
        rewritten.insert(part.to_string(), rewrite_slide(&xml, shape_edits)?);
    }

    log::debug!(
        "Applied {} entries to {} slides, skipped {}",
        report.applied.len(),
        rewritten.len(),
        report.skipped.len()
    );

    Ok((repackage(document, &rewritten)?, report))
}

/// `Slide{n}-{shapeId}` for every top-level shape of every slide.
fn shape_lookup(document: &PptxDocument) -> Result<HashMap<String, ShapeTarget>> {
    let mut lookup = HashMap::new();
    for slide in 1..=document.slide_count() {
        for shape in document.raw_shapes(slide)? {
            lookup.insert(
                slide_region_id(slide, &shape.id),
                ShapeTarget {
                    slide,
                    has_text_frame: shape.has_text_frame(),
                    shape_id: shape.id,
                },
            );
        }
    }
    Ok(lookup)
}

fn xml_err<E: std::fmt::Display>(e: E) -> Error {
    Error::XmlError(e.to_string())
}

fn zip_err<E: std::fmt::Display>(e: E) -> Error {
    Error::ZipError(e.to_string())
}

/// The `p:sp` currently being copied.
#[derive(Debug)]
struct SpState {
    depth: usize,
    prefix: String,
    id: Option<String>,
    has_body: bool,
}

/// Copy a slide part, replacing the text of the `p:sp` shapes named in
/// `edits` (keyed by `cNvPr/@id`).
fn rewrite_slide(xml: &str, edits: &HashMap<String, String>) -> Result<Vec<u8>> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut current: Option<SpState> = None;

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match event {
            Event::Eof => break,
            Event::Start(e) => {
                let local = local_name(e.name().as_ref()).to_vec();

                match current.as_mut() {
                    None => {
                        if top_level_shape(&stack, &local) == Some(ShapeElement::Sp) {
                            current = Some(SpState {
                                depth: stack.len(),
                                prefix: prefix_of(e.name().as_ref()),
                                id: None,
                                has_body: false,
                            });
                        }
                    }
                    Some(sp) => {
                        visit_sp_child(sp, &stack, &local, &e);
                        let rel = stack.len() - sp.depth;

                        if rel == 1 && local == b"txBody" {
                            if let Some(text) = sp.id.as_ref().and_then(|id| edits.get(id)) {
                                sp.has_body = true;
                                let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                                let children = read_subtree(&mut reader)?;
                                writer.write_event(Event::Start(e)).map_err(xml_err)?;
                                write_text_body(&mut writer, &children, text)?;
                                writer
                                    .write_event(Event::End(BytesEnd::new(qname)))
                                    .map_err(xml_err)?;
                                continue;
                            }
                        }
                        if rel == 1 && local == b"extLst" {
                            insert_missing_body(&mut writer, sp, edits)?;
                        }
                    }
                }

                stack.push(local);
                writer.write_event(Event::Start(e)).map_err(xml_err)?;
            }
            Event::Empty(e) => {
                if let Some(sp) = current.as_mut() {
                    let local = local_name(e.name().as_ref()).to_vec();
                    visit_sp_child(sp, &stack, &local, &e);
                    let rel = stack.len() - sp.depth;

                    if rel == 1 && local == b"txBody" {
                        if let Some(text) = sp.id.as_ref().and_then(|id| edits.get(id)) {
                            sp.has_body = true;
                            let qname = String::from_utf8_lossy(e.name().as_ref()).to_string();
                            writer.write_event(Event::Start(e)).map_err(xml_err)?;
                            write_text_body(&mut writer, &[], text)?;
                            writer
                                .write_event(Event::End(BytesEnd::new(qname)))
                                .map_err(xml_err)?;
                            continue;
                        }
                    }
                    if rel == 1 && local == b"extLst" {
                        insert_missing_body(&mut writer, sp, edits)?;
                    }
                }
                writer.write_event(Event::Empty(e)).map_err(xml_err)?;
            }
            Event::End(e) => {
                stack.pop();
                if let Some(sp) = current.as_mut() {
                    if sp.depth == stack.len() {
                        insert_missing_body(&mut writer, sp, edits)?;
                        current = None;
                    }
                }
                writer.write_event(Event::End(e)).map_err(xml_err)?;
            }
            other => writer.write_event(other).map_err(xml_err)?,
        }
    }

    Ok(writer.into_inner())
}

fn visit_sp_child(sp: &mut SpState, stack: &[Vec<u8>], local: &[u8], e: &BytesStart) {
    let rel = stack.len() - sp.depth;
    let in_nv = stack
        .get(sp.depth + 1)
        .is_some_and(|n| n.starts_with(b"nv"));

    if rel == 2 && in_nv && local == b"cNvPr" && sp.id.is_none() {
        sp.id = e
            .attributes()
            .flatten()
            .find(|a| a.key.as_ref() == b"id")
            .map(|a| String::from_utf8_lossy(&a.value).to_string());
    }
}

/// Give a targeted `p:sp` that never had a text body a fresh one.
fn insert_missing_body(
    writer: &mut Writer<Vec<u8>>,
    sp: &mut SpState,
    edits: &HashMap<String, String>,
) -> Result<()> {
    if sp.has_body {
        return Ok(());
    }
    let Some(text) = sp.id.as_ref().and_then(|id| edits.get(id)) else {
        return Ok(());
    };
    sp.has_body = true;

    let body = format!("{}txBody", sp.prefix);
    writer
        .write_event(Event::Start(BytesStart::new(body.clone())))
        .map_err(xml_err)?;
    for name in ["bodyPr", "lstStyle"] {
        writer
            .write_event(Event::Empty(BytesStart::new(format!("{DRAWING_PREFIX}{name}"))))
            .map_err(xml_err)?;
    }
    write_paragraphs(writer, DRAWING_PREFIX, None, None, text)?;
    writer
        .write_event(Event::End(BytesEnd::new(body)))
        .map_err(xml_err)?;
    Ok(())
}

/// Collect the events of an element's content, consuming its end tag.
fn read_subtree(reader: &mut Reader<&[u8]>) -> Result<Vec<Event<'static>>> {
    let mut depth = 0usize;
    let mut events = Vec::new();

    loop {
        let event = reader.read_event().map_err(xml_err)?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(events);
                }
                depth -= 1;
            }
            Event::Eof => {
                return Err(Error::XmlError(
                    "Unexpected end of document inside txBody".to_string(),
                ))
            }
            _ => {}
        }
        events.push(event.into_owned());
    }
}

/// Write the new content of a text body.
///
/// Body properties and list styles are kept. All paragraphs are replaced by
/// one paragraph per line of `text`, carrying over the first paragraph's
/// properties and the first run's character properties.
fn write_text_body(
    writer: &mut Writer<Vec<u8>>,
    children: &[Event<'static>],
    text: &str,
) -> Result<()> {
    let parts = subtrees(children);
    let first_paragraph = parts.iter().find(|s| element_name(s) == Some(b"p".as_slice()));

    for part in parts.iter().filter(|s| element_name(s) != Some(b"p".as_slice())) {
        for event in part.iter() {
            writer.write_event(event.clone()).map_err(xml_err)?;
        }
    }

    let prefix = first_paragraph
        .or_else(|| parts.first())
        .and_then(|s| qualified_name(s))
        .map(|name| prefix_of(&name))
        .unwrap_or_else(|| DRAWING_PREFIX.to_string());

    let paragraph_props = first_paragraph.and_then(|p| {
        subtrees(inner(p))
            .into_iter()
            .find(|s| element_name(s) == Some(b"pPr".as_slice()))
            .map(<[Event<'static>]>::to_vec)
    });
    let run_props = first_paragraph.and_then(|p| {
        find_descendant(p, b"rPr").or_else(|| {
            find_descendant(p, b"endParaRPr")
                .map(|props| rename(&props, &format!("{prefix}rPr")))
        })
    });

    write_paragraphs(
        writer,
        &prefix,
        paragraph_props.as_deref(),
        run_props.as_deref(),
        text,
    )
}

fn write_paragraphs(
    writer: &mut Writer<Vec<u8>>,
    prefix: &str,
    paragraph_props: Option<&[Event<'static>]>,
    run_props: Option<&[Event<'static>]>,
    text: &str,
) -> Result<()> {
    let tag = |name: &str| format!("{prefix}{name}");

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);

        writer
            .write_event(Event::Start(BytesStart::new(tag("p"))))
            .map_err(xml_err)?;
        for event in paragraph_props.unwrap_or_default() {
            writer.write_event(event.clone()).map_err(xml_err)?;
        }

        for (i, segment) in line.split(LINE_BREAK).enumerate() {
            if i > 0 {
                writer
                    .write_event(Event::Empty(BytesStart::new(tag("br"))))
                    .map_err(xml_err)?;
            }
            if segment.is_empty() {
                continue;
            }

            writer
                .write_event(Event::Start(BytesStart::new(tag("r"))))
                .map_err(xml_err)?;
            for event in run_props.unwrap_or_default() {
                writer.write_event(event.clone()).map_err(xml_err)?;
            }
            writer
                .write_event(Event::Start(BytesStart::new(tag("t"))))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&escape_xml_invalid(segment))))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(tag("t"))))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(tag("r"))))
                .map_err(xml_err)?;
        }

        writer
            .write_event(Event::End(BytesEnd::new(tag("p"))))
            .map_err(xml_err)?;
    }

    Ok(())
}

/// Replace characters XML 1.0 cannot carry with `_xHHHH_` escapes.
fn escape_xml_invalid(text: &str) -> Cow<'_, str> {
    let invalid = |c: char| {
        matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
    };
    if !text.contains(invalid) {
        return Cow::Borrowed(text);
    }

    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if invalid(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Split a flat event list into its top-level elements. Loose text between
/// elements is dropped.
fn subtrees<'a>(events: &'a [Event<'static>]) -> Vec<&'a [Event<'static>]> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;

    for (i, event) in events.iter().enumerate() {
        match event {
            Event::Start(_) => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(&events[start..=i]);
                }
            }
            Event::Empty(_) if depth == 0 => out.push(&events[i..=i]),
            _ => {}
        }
    }

    out
}

/// Content of an element subtree, without its own start and end tags.
fn inner<'a>(subtree: &'a [Event<'static>]) -> &'a [Event<'static>] {
    match subtree.first() {
        Some(Event::Start(_)) if subtree.len() >= 2 => &subtree[1..subtree.len() - 1],
        _ => &[],
    }
}

fn qualified_name(subtree: &[Event<'static>]) -> Option<Vec<u8>> {
    match subtree.first()? {
        Event::Start(e) | Event::Empty(e) => Some(e.name().as_ref().to_vec()),
        _ => None,
    }
}

fn element_name<'a>(subtree: &'a [Event<'static>]) -> Option<&'a [u8]> {
    match subtree.first()? {
        Event::Start(e) | Event::Empty(e) => Some(local_name(e.name().into_inner())),
        _ => None,
    }
}

/// First element named `name` anywhere in `events`, with its content.
fn find_descendant(events: &[Event<'static>], name: &[u8]) -> Option<Vec<Event<'static>>> {
    let start = events.iter().position(|event| match event {
        Event::Start(e) | Event::Empty(e) => local_name(e.name().as_ref()) == name,
        _ => false,
    })?;

    if matches!(events[start], Event::Empty(_)) {
        return Some(vec![events[start].clone()]);
    }

    subtrees(&events[start..]).first().map(|s| s.to_vec())
}

/// Re-tag an element subtree, keeping attributes and content.
fn rename(subtree: &[Event<'static>], qname: &str) -> Vec<Event<'static>> {
    let last = subtree.len().saturating_sub(1);
    subtree
        .iter()
        .enumerate()
        .map(|(i, event)| match event {
            Event::Start(e) if i == 0 => Event::Start(
                BytesStart::new(qname.to_string()).with_attributes(e.attributes().flatten()),
            ),
            Event::Empty(e) if i == 0 => Event::Empty(
                BytesStart::new(qname.to_string()).with_attributes(e.attributes().flatten()),
            ),
            Event::End(_) if i == last => Event::End(BytesEnd::new(qname.to_string())),
            other => other.clone(),
        })
        .collect()
}

/// Namespace prefix of a qualified name, including the colon.
fn prefix_of(qname: &[u8]) -> String {
    match qname.iter().position(|&b| b == b':') {
        Some(pos) => String::from_utf8_lossy(&qname[..=pos]).to_string(),
        None => String::new(),
    }
}

/// Build the output package, replacing the parts in `rewritten`.
fn repackage(document: &PptxDocument, rewritten: &HashMap<String, Vec<u8>>) -> Result<Vec<u8>> {
    let mut archive = document.archive()?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for i in 0..archive.len() {
        let file = archive.by_index_raw(i).map_err(zip_err)?;
        match rewritten.get(file.name()) {
            Some(content) => {
                let name = file.name().to_string();
                let method = match file.compression() {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let options = FileOptions::default()
                    .compression_method(method)
                    .last_modified_time(file.last_modified());
                drop(file);

                writer.start_file(name, options).map_err(zip_err)?;
                writer.write_all(content)?;
            }
            None => writer.raw_copy_file(file).map_err(zip_err)?,
        }
    }

    Ok(writer.finish().map_err(zip_err)?.into_inner())
}
